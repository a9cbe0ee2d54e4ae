//! Scripted device for unit tests.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flashrpc_peer::{Result, RpcCaller};
use serde_json::Value;

type Script = Box<dyn FnMut(&str, &Value) -> Result<Value> + Send>;

/// An [`RpcCaller`] that answers every request with a closure and records
/// what was asked.
pub struct ScriptedRpc {
    script: Script,
    calls: Vec<(String, Option<Value>)>,
}

impl ScriptedRpc {
    pub fn new(script: impl FnMut(&str, &Value) -> Result<Value> + Send + 'static) -> Self {
        Self {
            script: Box::new(script),
            calls: Vec::new(),
        }
    }

    pub fn calls(&self) -> &[(String, Option<Value>)] {
        &self.calls
    }

    pub fn methods(&self) -> Vec<&str> {
        self.calls.iter().map(|(method, _)| method.as_str()).collect()
    }
}

impl RpcCaller for ScriptedRpc {
    async fn request(&mut self, method: &str, params: Option<Value>) -> Result<Value> {
        let args = params.clone().unwrap_or(Value::Null);
        self.calls.push((method.to_string(), params));
        (self.script)(method, &args)
    }
}

pub fn encode_block(data: &[u8]) -> Value {
    Value::String(STANDARD.encode(data))
}
