use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use plumber::action::{Action, ActionFactory, PortActions};
use plumber::message::Message;
use plumber::ports::PortHub;
use plumber::Plumber;

const RULES: &str = "\
# plumbing rules in the spirit of plan9
addr = ':([0-9]+)'

# web urls
data matches 'https?://[^ ]+'
plumb to web

# email addresses
data matches '[a-zA-Z0-9_+.\\-]+@[a-zA-Z0-9_.\\-]+'
plumb to email

# man page references like intro(1)
data matches '([a-zA-Z0-9_\\-.]+)\\(([1-8])\\)'
plumb to man

# source files, optionally with a :line address
data matches '([^ ]+\\.(c|h|go|rs))('$addr')?'
arg isfile $1
plumb to edit

# named ports picked by a branch
data matches 'port [a-z]+'
{
data is 'port alpha'
plumb to alpha
}
{
data is 'port beta'
plumb to beta
}

# phone numbers
type is text
data matches '\\+[0-9 ]+'
attr add 'cat=phone'
plumb to call
";

#[derive(Clone, Default)]
struct Recording {
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl Recording {
    fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Action for Recording {
    fn apply(&mut self, _msg: &Message, verb: &str, data: &str) -> (bool, bool) {
        self.calls
            .lock()
            .unwrap()
            .push((verb.to_string(), data.to_string()));
        (true, true)
    }
}

impl ActionFactory for Recording {
    fn worker(&self) -> Box<dyn Action> {
        Box::new(self.clone())
    }
}

fn plumber_with(recording: &Recording) -> Plumber {
    let p = Plumber::new(Arc::new(recording.clone())).with_fs(false);
    p.load_rules(RULES, None).unwrap();
    p
}

#[test]
fn each_input_hits_its_own_ruleset() {
    let cases: &[(&str, usize)] = &[
        ("https://9p.sdf.org", 0),
        ("glenda@9front.org", 1),
        ("intro(1)", 2),
        ("src/main.rs:87", 3),
        ("plumber.h:23", 3),
        ("plumber.go", 3),
        ("port alpha", 4),
        ("port beta", 4),
        ("+49 30 12345678", 5),
    ];
    let rec = Recording::default();
    let p = plumber_with(&rec);
    for (data, want) in cases {
        let msg = Message::new("", "", "", "", data);
        let (out, idx) = p
            .evaluate(&msg)
            .unwrap()
            .unwrap_or_else(|| panic!("no match for {data}"));
        assert_eq!(idx, *want, "input {data}");
        assert_eq!(out.ndata, out.data.len());
    }
}

#[test]
fn unmatched_inputs_fall_through() {
    let rec = Recording::default();
    let p = plumber_with(&rec);
    for data in ["just words here", "docs/paper.pdf", ""] {
        let msg = Message::new("", "", "", "", data);
        assert!(p.evaluate(&msg).unwrap().is_none(), "input {data:?}");
    }
    assert!(rec.calls().is_empty());
}

#[test]
fn branches_pick_their_port() {
    let rec = Recording::default();
    let p = plumber_with(&rec);
    assert!(p.eval("port beta", "", "", "").unwrap());
    assert_eq!(rec.calls(), vec![("to".to_string(), "beta".to_string())]);

    let rec = Recording::default();
    let p = plumber_with(&rec);
    assert!(p.eval("port alpha", "", "", "").unwrap());
    assert_eq!(rec.calls(), vec![("to".to_string(), "alpha".to_string())]);

    // the branch head alone satisfies no branch, so nothing matches
    let rec = Recording::default();
    let p = plumber_with(&rec);
    assert!(!p.eval("port gamma", "", "", "").unwrap());
    assert!(rec.calls().is_empty());
}

#[test]
fn attributes_ride_along_with_the_match() {
    let rec = Recording::default();
    let p = plumber_with(&rec);
    let msg = Message::new("phone-app", "", "", "", "+49 30 12345678");
    let (out, _) = p.evaluate(&msg).unwrap().unwrap();
    assert_eq!(out.attr.get("cat").map(String::as_str), Some("phone"));
    assert_eq!(rec.calls(), vec![("to".to_string(), "call".to_string())]);
}

#[test]
fn rules_text_and_ports_reflect_the_file() {
    let rec = Recording::default();
    let p = plumber_with(&rec);
    assert_eq!(p.rules_text(), RULES);
    assert_eq!(
        p.ports(),
        vec!["web", "email", "man", "edit", "alpha", "beta", "call"]
    );
}

#[test]
fn wire_messages_route_like_constructed_ones() {
    let rec = Recording::default();
    let p = plumber_with(&rec);
    let wire = "shell\n\n/tmp\ntext\n\n18\nhttps://9p.sdf.org";
    let msg = Message::parse(wire).unwrap();
    let (out, idx) = p.evaluate(&msg).unwrap().unwrap();
    assert_eq!(idx, 0);
    assert_eq!(out.data, "https://9p.sdf.org");
}

#[test]
fn filesystem_gate_filters_with_fs_on() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("notes.c"), "int main;").unwrap();

    let rec = Recording::default();
    let p = Plumber::new(Arc::new(rec.clone()));
    p.load_rules(RULES, None).unwrap();

    let wdir = dir.path().to_string_lossy().to_string();
    let present = Message::new("", "", &wdir, "", "notes.c:3");
    let (_, idx) = p.evaluate(&present).unwrap().unwrap();
    assert_eq!(idx, 3);

    let missing = Message::new("", "", &wdir, "", "gone.c:3");
    assert!(p.evaluate(&missing).unwrap().is_none());
}

#[tokio::test]
async fn deliveries_reach_port_subscribers() {
    let hub = PortHub::new();
    let p = Plumber::new(Arc::new(PortActions::new(hub.clone()))).with_fs(false);
    p.load_rules(RULES, None).unwrap();
    for name in p.ports() {
        hub.register(&name);
    }

    let mut rx = hub.subscribe("web").unwrap();
    assert!(p.eval("https://9p.sdf.org", "shell", "", "/").unwrap());
    let delivered = rx.recv().await.unwrap();
    assert_eq!(delivered.data, "https://9p.sdf.org");
    assert_eq!(delivered.src, "shell");
}

#[test]
fn reload_swaps_rules_atomically() {
    let rec = Recording::default();
    let p = plumber_with(&rec);
    p.load_rules("data matches '.*'\nplumb to sink\n", None)
        .unwrap();
    assert_eq!(p.ports(), vec!["sink"]);
    assert!(p.eval("anything at all", "", "", "").unwrap());

    // a broken file leaves the replacement untouched
    assert!(p.load_rules("nonsense clause here\n", None).is_err());
    assert_eq!(p.ports(), vec!["sink"]);
}

#[test]
fn seeded_environment_is_visible_to_rules() {
    let rec = Recording::default();
    let p = Plumber::new(Arc::new(rec.clone())).with_fs(false);
    let seed = HashMap::from([("project".to_string(), "plumber".to_string())]);
    p.load_rules("data is $project\nplumb to project\n", Some(seed))
        .unwrap();
    assert!(p.eval("plumber", "", "", "").unwrap());
    assert!(!p.eval("other", "", "", "").unwrap());
}
