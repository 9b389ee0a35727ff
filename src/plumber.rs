use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};

use anyhow::{bail, Context};
use tracing::info;

use crate::action::ActionFactory;
use crate::grammar::RuleList;
use crate::kernel::{EvalError, Kernel};
use crate::message::Message;
use crate::parser::{parse_rules, ParseError};

/// Owns the active rule list and the action factory. Reloads swap the rule
/// list atomically; evaluations started before a swap keep running against
/// the list they snapshotted at entry.
pub struct Plumber {
    rules: RwLock<Arc<RuleList>>,
    factory: Arc<dyn ActionFactory>,
    with_fs: bool,
}

impl Plumber {
    pub fn new(factory: Arc<dyn ActionFactory>) -> Self {
        Plumber {
            rules: RwLock::new(Arc::new(RuleList::default())),
            factory,
            with_fs: true,
        }
    }

    /// Toggle the isfile/isdir filesystem probes; tests run with them off.
    pub fn with_fs(mut self, enabled: bool) -> Self {
        self.with_fs = enabled;
        self
    }

    fn snapshot(&self) -> Arc<RuleList> {
        self.rules.read().expect("rules lock poisoned").clone()
    }

    /// Parse `source` and install it as the active rule list. On a parse
    /// error the previous list stays in place. An optional seed environment
    /// is merged in under the file's own assignments.
    pub fn load_rules(
        &self,
        source: &str,
        env: Option<HashMap<String, String>>,
    ) -> Result<(), ParseError> {
        let rl = parse_rules(source, env)?;
        info!(
            rulesets = rl.rulesets.len(),
            ports = rl.ports().len(),
            "installing plumbing rules"
        );
        *self.rules.write().expect("rules lock poisoned") = Arc::new(rl);
        Ok(())
    }

    /// Load rules from `path`, falling back to `fallback` when `path` is
    /// empty or does not exist.
    pub fn load_rules_file(
        &self,
        path: &str,
        fallback: &str,
        env: Option<HashMap<String, String>>,
    ) -> anyhow::Result<()> {
        let name = if !path.is_empty() && Path::new(path).exists() {
            path
        } else if !fallback.is_empty() && Path::new(fallback).exists() {
            fallback
        } else if !path.is_empty() {
            path // let the read fail with the name the user gave
        } else {
            bail!("no plumbing file");
        };
        let source = fs::read_to_string(name)
            .with_context(|| format!("reading plumbing file {name}"))?;
        self.load_rules(&source, env)
            .with_context(|| format!("parsing plumbing file {name}"))?;
        Ok(())
    }

    /// Route a message through the rules. Returns the mutated message and
    /// the index of the matching top-level ruleset, or None when nothing
    /// applied.
    #[tracing::instrument(skip(self, msg))]
    pub fn evaluate(&self, msg: &Message) -> Result<Option<(Message, usize)>, EvalError> {
        let rules = self.snapshot();
        for (i, rs) in rules.rulesets.iter().enumerate() {
            let mut kernel = Kernel::new(msg.clone(), self.with_fs, self.factory.worker());
            if kernel.run(rs, &rules.env)? {
                return Ok(Some((kernel.into_message(), i)));
            }
        }
        Ok(None)
    }

    /// Route a message, reporting only whether some ruleset matched.
    pub fn process(&self, msg: &Message) -> Result<bool, EvalError> {
        Ok(self.evaluate(msg)?.is_some())
    }

    /// Plumb a plain text fragment.
    pub fn eval(&self, data: &str, src: &str, dst: &str, wdir: &str) -> Result<bool, EvalError> {
        self.process(&Message::new(src, dst, wdir, "", data))
    }

    /// Destination ports named by the active rules, in traversal order.
    pub fn ports(&self) -> Vec<String> {
        self.snapshot().ports()
    }

    /// The active plumbing file, byte for byte as it was loaded.
    pub fn rules_text(&self) -> String {
        self.snapshot().source.clone()
    }

    /// A copy of the active environment map.
    pub fn env(&self) -> HashMap<String, String> {
        self.snapshot().env.clone()
    }
}
