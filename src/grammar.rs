use std::collections::HashMap;
use std::fmt;

/// The grammar of clauses: every object with the verbs it accepts.
static GRAMMAR: &[(&str, &[&str])] = &[
    ("arg", &["isdir", "isfile"]),
    ("attr", &["add", "delete"]),
    ("data", &["is", "set", "matches"]),
    ("dst", &["is", "set", "matches"]),
    ("plumb", &["client", "start", "to"]),
    ("src", &["is", "set", "matches"]),
    ("type", &["is"]),
    ("wdir", &["is", "set", "matches"]),
];

/// True if `verb` is legal for `obj`.
pub fn valid(obj: &str, verb: &str) -> bool {
    GRAMMAR
        .iter()
        .find(|(o, _)| *o == obj)
        .map(|(_, verbs)| verbs.contains(&verb))
        .unwrap_or(false)
}

/// One step of a rule: object, verb and an unparsed data blob that may
/// contain quotes and `$`-variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub obj: String,
    pub verb: String,
    pub data: String,
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.obj, self.verb, self.data)
    }
}

/// A node of a ruleset: either a clause or a nested branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleNode {
    Clause(Clause),
    Branch(Ruleset),
}

/// An ordered sequence of clauses and branches, evaluated front to back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ruleset {
    pub stmts: Vec<RuleNode>,
}

impl Ruleset {
    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }

    fn collect_ports(&self, ports: &mut Vec<String>) {
        for node in &self.stmts {
            match node {
                RuleNode::Clause(cl) => {
                    if cl.obj == "plumb" && cl.verb == "to" && !ports.contains(&cl.data) {
                        ports.push(cl.data.clone());
                    }
                }
                RuleNode::Branch(sub) => sub.collect_ports(ports),
            }
        }
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = "\t".repeat(depth);
        for node in &self.stmts {
            match node {
                RuleNode::Clause(cl) => writeln!(f, "{pad}{cl}")?,
                RuleNode::Branch(sub) => {
                    writeln!(f, "{pad}{{")?;
                    sub.fmt_indented(f, depth + 1)?;
                    writeln!(f, "{pad}}}")?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Ruleset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

/// The parse result of a plumbing file: ordered top-level rulesets, the
/// environment map and the raw file text kept verbatim for readback.
#[derive(Debug, Clone, Default)]
pub struct RuleList {
    pub rulesets: Vec<Ruleset>,
    pub env: HashMap<String, String>,
    pub source: String,
}

impl RuleList {
    /// Every destination port named by a `plumb to` clause, in traversal
    /// order, without duplicates.
    pub fn ports(&self) -> Vec<String> {
        let mut ports = Vec::new();
        for rs in &self.rulesets {
            rs.collect_ports(&mut ports);
        }
        ports
    }
}
