use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use crate::grammar::{self, Clause, RuleList, RuleNode, Ruleset};
use crate::token::canonical;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid rule: '{0}'")]
    InvalidRule(String),
    #[error("unmatched '}}'")]
    UnmatchedClose,
    #[error("unterminated branch at end of file")]
    UnterminatedBranch,
}

/// Parse a plumbing file into an ordered list of rulesets.
///
/// Lines starting with `#` are comments. `NAME = VALUE` lines populate the
/// environment map. A blank line ends the current ruleset. `{` and `}` on
/// their own lines open and close a nested branch. Everything else must be
/// an `OBJECT VERB DATA` clause accepted by the grammar.
///
/// The raw file text is retained verbatim on the result for readback. An
/// optional seed environment is merged in before the file's own
/// assignments.
pub fn parse_rules(
    source: &str,
    env: Option<HashMap<String, String>>,
) -> Result<RuleList, ParseError> {
    let mut rl = RuleList {
        env: env.unwrap_or_default(),
        source: source.to_string(),
        ..RuleList::default()
    };
    // stack[0] is the top-level ruleset under construction, deeper entries
    // are open branches
    let mut stack: Vec<Ruleset> = vec![Ruleset::default()];

    for raw in source.lines() {
        if raw.starts_with('#') {
            continue;
        }
        let line = canonical(raw);

        // environment assignment: force spaces around the first '=' and see
        // if it lands in the second token position
        let t = canonical(&line.replacen('=', " = ", 1));
        let parts: Vec<&str> = t.splitn(3, ' ').collect();
        if parts.len() == 3 && parts[1] == "=" {
            rl.env.insert(parts[0].to_string(), parts[2].to_string());
            continue;
        }

        match line.as_str() {
            "{" => {
                stack.push(Ruleset::default());
            }
            "}" => {
                if stack.len() < 2 {
                    return Err(ParseError::UnmatchedClose);
                }
                let branch = stack.pop().expect("scope stack underflow");
                stack
                    .last_mut()
                    .expect("scope stack underflow")
                    .stmts
                    .push(RuleNode::Branch(branch));
            }
            "" => {
                // a blank line only closes a ruleset at the top level
                if stack.len() == 1 && !stack[0].is_empty() {
                    rl.rulesets.push(std::mem::take(&mut stack[0]));
                }
            }
            _ => {
                let words: Vec<&str> = line.splitn(3, ' ').collect();
                if words.len() != 3 || !grammar::valid(words[0], words[1]) {
                    return Err(ParseError::InvalidRule(line.clone()));
                }
                stack
                    .last_mut()
                    .expect("scope stack underflow")
                    .stmts
                    .push(RuleNode::Clause(Clause {
                        obj: words[0].to_string(),
                        verb: words[1].to_string(),
                        data: words[2].to_string(),
                    }));
            }
        }
    }

    if stack.len() > 1 {
        return Err(ParseError::UnterminatedBranch);
    }
    if !stack[0].is_empty() {
        rl.rulesets.push(stack.remove(0));
    }
    debug!(
        rulesets = rl.rulesets.len(),
        env = rl.env.len(),
        "parsed plumbing rules"
    );
    Ok(rl)
}
