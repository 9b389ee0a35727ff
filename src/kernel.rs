use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::action::Action;
use crate::grammar::{Clause, RuleNode, Ruleset};
use crate::message::{unpack_attr, Message};
use crate::token::unquote;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("bad pattern in matches clause: {0}")]
    Regex(#[from] regex::Error),
    #[error("not implemented: '{0}'")]
    NotImplemented(String),
}

/// Evaluation state for one message against one ruleset: a working copy of
/// the message, the capture groups of the most recent `matches`, scratch
/// locals and the action worker for `plumb` clauses.
pub struct Kernel {
    msg: Message,
    captures: Vec<String>,
    vars: HashMap<String, String>,
    with_fs: bool,
    worker: Box<dyn Action>,
}

// everything a branch needs restored when it does not commit
struct Snapshot {
    msg: Message,
    captures: Vec<String>,
    vars: HashMap<String, String>,
}

impl Kernel {
    pub fn new(msg: Message, with_fs: bool, worker: Box<dyn Action>) -> Self {
        let mut msg = msg;
        if msg.kind.is_empty() {
            msg.kind = "text".to_string();
        }
        Kernel {
            msg,
            captures: Vec::new(),
            vars: HashMap::new(),
            with_fs,
            worker,
        }
    }

    /// The working message, consumed when a ruleset has matched.
    pub fn into_message(self) -> Message {
        self.msg
    }

    /// Scratch local set as a side effect of `isdir`/`isfile`/`attr` verbs.
    pub fn local(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    // field lookup; `arg` and `plumb` carry no value
    fn get(&self, name: &str) -> Option<String> {
        match name {
            "arg" | "plumb" => Some(String::new()),
            _ => self.msg.get(name),
        }
    }

    // expand $-variables: capture groups first, then message fields, then
    // the ruleset environment
    fn expand(&self, s: &str, env: &HashMap<String, String>) -> String {
        let look = |name: &str| -> String {
            if let Ok(i) = name.parse::<usize>() {
                if i < self.captures.len() {
                    return self.captures[i].clone();
                }
            }
            if let Some(v) = self.get(name) {
                return v;
            }
            env.get(name).cloned().unwrap_or_default()
        };
        unquote(s, Some(&look))
    }

    /// Evaluate a whole ruleset, depth first. Branches run against a
    /// snapshot of the kernel; a branch that does not commit restores it.
    /// A ruleset that contains branches only matches through one of them.
    pub fn run(&mut self, rs: &Ruleset, env: &HashMap<String, String>) -> Result<bool, EvalError> {
        let mut saw_branch = false;
        for node in &rs.stmts {
            match node {
                RuleNode::Clause(cl) => {
                    let (ok, done) = self.execute(cl, env)?;
                    if !ok {
                        return Ok(false);
                    }
                    if done {
                        return Ok(true);
                    }
                }
                RuleNode::Branch(sub) => {
                    saw_branch = true;
                    let snap = self.snapshot();
                    if self.run(sub, env)? {
                        return Ok(true);
                    }
                    self.restore(snap);
                }
            }
        }
        Ok(!saw_branch)
    }

    /// Execute one clause. Returns (ok, done): `ok` is whether the clause
    /// holds, `done` whether it terminates the rule early.
    pub fn execute(
        &mut self,
        cl: &Clause,
        env: &HashMap<String, String>,
    ) -> Result<(bool, bool), EvalError> {
        let obj = self.get(&cl.obj).unwrap_or_default();
        let datum = self.expand(&cl.data, env);

        let mut done = false;
        let ok = match cl.verb.as_str() {
            "matches" => {
                let re = Regex::new(&datum)?;
                let matched = match re.captures(&obj) {
                    // the first match has to span the object exactly
                    Some(caps) if &caps[0] == obj => {
                        self.captures = caps
                            .iter()
                            .map(|m| m.map_or_else(String::new, |m| m.as_str().to_string()))
                            .collect();
                        true
                    }
                    _ => false,
                };
                debug!(obj = %obj, pattern = %datum, matched, "matches clause");
                matched
            }
            "is" => obj == datum,
            "isdir" => self.probe(&datum, true),
            "isfile" => self.probe(&datum, false),
            "set" => self.msg.set(&cl.obj, &datum),
            "add" => {
                self.msg.attr.extend(unpack_attr(&datum));
                self.vars.insert("attr".to_string(), self.msg.attr_string());
                true
            }
            "delete" => {
                self.msg.attr.remove(&datum);
                self.vars.insert("attr".to_string(), self.msg.attr_string());
                true
            }
            "to" | "start" | "client" => {
                let (ok, d) = self.worker.apply(&self.msg, &cl.verb, &datum);
                done = d;
                ok
            }
            _ => return Err(EvalError::NotImplemented(cl.to_string())),
        };

        self.msg.ndata = self.msg.data.len();
        Ok((ok, done))
    }

    // stat gate for isdir/isfile; stat failures are a non-match, and with
    // the filesystem disabled the gate always passes
    fn probe(&mut self, datum: &str, want_dir: bool) -> bool {
        let ok = if self.with_fs {
            let path = if Path::new(datum).is_absolute() {
                PathBuf::from(datum)
            } else {
                Path::new(&self.msg.wdir).join(datum)
            };
            match fs::metadata(&path) {
                Ok(meta) => meta.is_dir() == want_dir,
                Err(_) => false,
            }
        } else {
            true
        };
        if ok {
            let var = if want_dir { "dir" } else { "file" };
            self.vars.insert(var.to_string(), datum.to_string());
        }
        ok
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            msg: self.msg.clone(),
            captures: self.captures.clone(),
            vars: self.vars.clone(),
        }
    }

    fn restore(&mut self, snap: Snapshot) {
        self.msg = snap.msg;
        self.captures = snap.captures;
        self.vars = snap.vars;
    }
}
