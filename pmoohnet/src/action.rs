//! Actions declared by a proxy and the invocations built from them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::errors::{OhNetError, Result};
use crate::native::{ActionHandle, ArgumentValue, NativeError, ParameterSpec};
use crate::session::{ObjectId, Session};

/// A service action registered with the native engine.
///
/// Actions belong to the proxy that declared them but are also tracked by
/// the session so that a global shutdown releases them.
pub struct Action {
    id: ObjectId,
    name: String,
    handle: ActionHandle,
    inputs: Vec<ParameterSpec>,
    outputs: Vec<ParameterSpec>,
    session: Session,
    released: AtomicBool,
}

impl Action {
    pub(crate) fn new(
        session: &Session,
        name: &str,
        inputs: Vec<ParameterSpec>,
        outputs: Vec<ParameterSpec>,
    ) -> Arc<Action> {
        let handle = session.stack().action_create(name, &inputs, &outputs);
        let action = Arc::new(Action {
            id: session.next_id(),
            name: name.to_string(),
            handle,
            inputs,
            outputs,
            session: session.clone(),
            released: AtomicBool::new(false),
        });
        session.register_action(&action);
        action
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> ActionHandle {
        self.handle
    }

    pub fn inputs(&self) -> &[ParameterSpec] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[ParameterSpec] {
        &self.outputs
    }

    /// Builds an invocation, matching `args` to the declared inputs by name.
    ///
    /// Arguments may be given in any order; the invocation carries them in
    /// declaration order.
    pub fn invocation(&self, args: &[(&str, ArgumentValue)]) -> Result<Invocation> {
        if self.released.load(Ordering::Acquire) {
            return Err(OhNetError::AlreadyShutdown(format!("action {}", self.name)));
        }

        if let Some((unknown, _)) = args
            .iter()
            .find(|(name, _)| !self.inputs.iter().any(|p| p.name == *name))
        {
            return Err(OhNetError::argument_mismatch(
                &self.name,
                format!("unexpected argument {}", unknown),
            ));
        }

        let mut inputs = Vec::with_capacity(self.inputs.len());
        for param in &self.inputs {
            let (_, value) = args
                .iter()
                .find(|(name, _)| *name == param.name)
                .ok_or_else(|| {
                    OhNetError::argument_mismatch(
                        &self.name,
                        format!("missing argument {}", param.name),
                    )
                })?;
            if value.kind() != param.kind {
                return Err(OhNetError::argument_mismatch(
                    &self.name,
                    format!(
                        "argument {} expects {}, got {}",
                        param.name,
                        param.kind.name(),
                        value.kind().name()
                    ),
                ));
            }
            inputs.push((param.name.clone(), value.clone()));
        }

        Ok(Invocation {
            action: self.handle,
            action_name: self.name.clone(),
            inputs,
            outputs: self.outputs.iter().map(|p| (p.clone(), None)).collect(),
        })
    }

    /// Releases the native action. Safe to call more than once.
    pub fn shutdown(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.session.deregister_action(self.id);
        self.session.stack().action_destroy(self.handle);
        debug!(action = %self.name, "Action released");
    }

    pub(crate) fn describe(&self) -> String {
        let render = |params: &[ParameterSpec]| {
            params
                .iter()
                .map(|p| format!("{}: {}", p.name, p.kind.name()))
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!(
            "      {}({}) -> ({})",
            self.name,
            render(&self.inputs),
            render(&self.outputs)
        )
    }
}

/// Input and output arguments of one action call.
#[derive(Debug, Clone)]
pub struct Invocation {
    action: ActionHandle,
    action_name: String,
    inputs: Vec<(String, ArgumentValue)>,
    outputs: Vec<(ParameterSpec, Option<ArgumentValue>)>,
}

impl Invocation {
    pub fn action(&self) -> ActionHandle {
        self.action
    }

    pub fn action_name(&self) -> &str {
        &self.action_name
    }

    pub fn inputs(&self) -> &[(String, ArgumentValue)] {
        &self.inputs
    }

    pub fn output_specs(&self) -> impl Iterator<Item = &ParameterSpec> {
        self.outputs.iter().map(|(spec, _)| spec)
    }

    /// Stores an output value; called by the native stack on completion.
    pub fn set_output(&mut self, name: &str, value: ArgumentValue) -> Result<(), NativeError> {
        let slot = self
            .outputs
            .iter_mut()
            .find(|(spec, _)| spec.name == name)
            .ok_or_else(|| NativeError::new(402, format!("no output argument {}", name)))?;
        if slot.0.kind != value.kind() {
            return Err(NativeError::new(
                402,
                format!("output {} expects {}", name, slot.0.kind.name()),
            ));
        }
        slot.1 = Some(value);
        Ok(())
    }

    pub(crate) fn into_output(self) -> Result<ActionOutput> {
        let mut values = Vec::with_capacity(self.outputs.len());
        for (spec, value) in self.outputs {
            let value = value.ok_or_else(|| {
                OhNetError::argument_mismatch(
                    &self.action_name,
                    format!("native stack left output {} unset", spec.name),
                )
            })?;
            values.push((spec.name, value));
        }
        Ok(ActionOutput { values })
    }
}

/// Output arguments of a completed invocation, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutput {
    values: Vec<(String, ArgumentValue)>,
}

impl ActionOutput {
    pub fn get(&self, name: &str) -> Option<&ArgumentValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgumentValue)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    fn take(&mut self, name: &str) -> Result<ArgumentValue> {
        let index = self
            .values
            .iter()
            .position(|(n, _)| n == name)
            .ok_or_else(|| OhNetError::ValueType {
                name: name.to_string(),
                expected: "declared output",
            })?;
        Ok(self.values.remove(index).1)
    }

    pub fn bool(&mut self, name: &str) -> Result<bool> {
        self.take(name)?.into_bool(name)
    }

    pub fn int(&mut self, name: &str) -> Result<i32> {
        self.take(name)?.into_int(name)
    }

    pub fn uint(&mut self, name: &str) -> Result<u32> {
        self.take(name)?.into_uint(name)
    }

    pub fn string(&mut self, name: &str) -> Result<String> {
        self.take(name)?.into_string(name)
    }

    pub fn binary(&mut self, name: &str) -> Result<Vec<u8>> {
        self.take(name)?.into_binary(name)
    }
}
