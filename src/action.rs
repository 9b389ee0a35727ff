use std::sync::Arc;

use tracing::{info, warn};

use crate::message::Message;
use crate::ports::PortHub;
use crate::token::quote;

/// The capability behind `plumb {to|start|client} DATA`. Returns
/// `(ok, done)`: `ok` is whether the delivery held, `done` whether the
/// clause terminates its rule. Actions must not mutate the message.
pub trait Action: Send {
    fn apply(&mut self, msg: &Message, verb: &str, data: &str) -> (bool, bool);
}

/// Hands out a fresh action worker per ruleset evaluation, so per-rule
/// state cannot leak between rulesets.
pub trait ActionFactory: Send + Sync {
    fn worker(&self) -> Box<dyn Action>;
}

/// Logs every delivery instead of performing it. `start` and `client`
/// terminate the rule, `to` lets it continue.
#[derive(Debug, Default, Clone)]
pub struct TraceAction;

impl Action for TraceAction {
    fn apply(&mut self, msg: &Message, verb: &str, data: &str) -> (bool, bool) {
        info!("==> {} {}", verb, quote(data));
        info!("    attr: {}", msg.attr_string());
        info!("    data: {}", msg.data);
        (true, verb == "start" || verb == "client")
    }
}

impl ActionFactory for TraceAction {
    fn worker(&self) -> Box<dyn Action> {
        Box::new(self.clone())
    }
}

/// Delivers `plumb to PORT` into a [`PortHub`]. The rule is terminal only
/// when somebody was listening on the port. The other plumb verbs are
/// refused; spawning processes and parking clients belong to the host.
pub struct PortAction {
    hub: Arc<PortHub>,
}

impl Action for PortAction {
    fn apply(&mut self, msg: &Message, verb: &str, data: &str) -> (bool, bool) {
        match verb {
            "to" => {
                let delivered = self.hub.post(data, msg);
                info!(port = %data, delivered, "plumb to");
                (true, delivered)
            }
            _ => {
                warn!(verb, "plumb verb not backed by this daemon");
                (false, false)
            }
        }
    }
}

/// Factory for [`PortAction`] workers sharing one hub.
pub struct PortActions {
    hub: Arc<PortHub>,
}

impl PortActions {
    pub fn new(hub: Arc<PortHub>) -> Self {
        PortActions { hub }
    }
}

impl ActionFactory for PortActions {
    fn worker(&self) -> Box<dyn Action> {
        Box::new(PortAction {
            hub: self.hub.clone(),
        })
    }
}
