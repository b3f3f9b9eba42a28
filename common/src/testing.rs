//! In-memory container runtime for tests
//!
//! Records every call and answers from a closure, so orchestration
//! sequences can be asserted without Docker.

use crate::runtime::{ContainerRuntime, MysqlInvocation};
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::Mutex;

type Responder = Box<dyn FnMut(&str, &str) -> Result<String> + Send>;

/// One `exec_mysql` call as seen by the runtime.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub container: String,
    pub user: String,
    pub database: Option<String>,
    pub batch: bool,
    pub input: String,
}

/// `ContainerRuntime` driven by a closure of `(container, sql) -> stdout`.
pub struct ScriptedRuntime {
    addresses: HashMap<String, String>,
    responder: Mutex<Responder>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedRuntime {
    /// Every query succeeds with empty output until `respond` is called.
    pub fn new() -> Self {
        Self {
            addresses: HashMap::new(),
            responder: Mutex::new(Box::new(|_, _| Ok(String::new()))),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Address returned by `inspect_address` for `container`.
    /// Unknown containers inspect as an empty string.
    pub fn with_address(mut self, container: &str, address: &str) -> Self {
        self.addresses
            .insert(container.to_string(), address.to_string());
        self
    }

    pub fn respond<F>(self, responder: F) -> Self
    where
        F: FnMut(&str, &str) -> Result<String> + Send + 'static,
    {
        Self {
            responder: Mutex::new(Box::new(responder)),
            ..self
        }
    }

    /// Snapshot of the calls made so far, oldest first.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Inputs sent to one container, oldest first.
    pub fn inputs_for(&self, container: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.container == container)
            .map(|c| c.input)
            .collect()
    }
}

impl Default for ScriptedRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerRuntime for ScriptedRuntime {
    async fn inspect_address(&self, container: &str) -> Result<String> {
        Ok(self.addresses.get(container).cloned().unwrap_or_default())
    }

    async fn exec_mysql(
        &self,
        container: &str,
        invocation: &MysqlInvocation<'_>,
        input: &[u8],
    ) -> Result<String> {
        let input = String::from_utf8_lossy(input).into_owned();
        self.calls
            .lock()
            .map_err(|_| anyhow!("call log poisoned"))?
            .push(RecordedCall {
                container: container.to_string(),
                user: invocation.credentials.user.clone(),
                database: invocation.database.map(str::to_string),
                batch: invocation.batch,
                input: input.clone(),
            });
        let mut responder = self
            .responder
            .lock()
            .map_err(|_| anyhow!("responder poisoned"))?;
        responder(container, &input).map(|out| out.trim().to_string())
    }
}
