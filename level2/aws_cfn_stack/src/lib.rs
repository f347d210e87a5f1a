//! Drives cloudformation: create or update a stack from a synthesized
//! template, wait for it to settle, read its outputs, and tear it down.
//! Ordering between resources is entirely up to cloudformation; this crate
//! only submits the template and reports the outcome.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use aws_sdk_cloudformation::{
    error::DisplayErrorContext,
    types::{Capability, OnFailure, Stack, StackEvent, StackStatus},
    Client,
};
use sitedeploy::SavedTemplate;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum StackError {
    #[error("Cloudformation request failed: {0}")]
    Sdk(String),

    #[error("Stack {stack} failed: {reason}")]
    Failed { stack: String, reason: String },

    #[error("Stack {0} does not exist")]
    NotFound(String),

    #[error("Failed to serialize template: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackProgress {
    Complete,
    InProgress,
    Failed,
}

/// progress of a create or update. Rollbacks count as failures: the stack
/// may be usable, but the change we asked for did not happen. A stack that
/// ends up deleted was rolled back by `OnFailure::Delete`.
pub fn classify_status(status: &StackStatus) -> StackProgress {
    match status {
        // done and return success:
        StackStatus::CreateComplete |
        StackStatus::UpdateComplete |
        StackStatus::ImportComplete => StackProgress::Complete,

        // keep trying
        StackStatus::CreateInProgress |
        StackStatus::DeleteInProgress |
        StackStatus::ImportInProgress |
        StackStatus::ImportRollbackInProgress |
        StackStatus::ReviewInProgress |
        StackStatus::RollbackInProgress |
        StackStatus::UpdateCompleteCleanupInProgress |
        StackStatus::UpdateInProgress |
        StackStatus::UpdateRollbackCompleteCleanupInProgress |
        StackStatus::UpdateRollbackInProgress => StackProgress::InProgress,

        _ => StackProgress::Failed,
    }
}

pub fn is_no_update_message(message: &str) -> bool {
    message.contains("No updates are to be performed")
}

fn is_missing_stack_message(message: &str) -> bool {
    message.contains("does not exist")
}

/// what we need to know about a stack between polls.
#[derive(Debug, Clone, PartialEq)]
pub struct StackState {
    pub stack_id: String,
    pub status: StackStatus,
    pub reason: Option<String>,
    pub outputs: HashMap<String, String>,
}

impl StackState {
    pub fn from_stack(stack: &Stack) -> Option<Self> {
        Some(Self {
            stack_id: stack.stack_id().or(stack.stack_name())?.to_string(),
            status: stack.stack_status()?.clone(),
            reason: stack.stack_status_reason().map(str::to_string),
            outputs: stack_outputs(stack),
        })
    }
}

pub fn stack_outputs(stack: &Stack) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for output in stack.outputs() {
        if let (Some(key), Some(val)) = (output.output_key(), output.output_value()) {
            out.insert(key.to_string(), val.to_string());
        }
    }
    out
}

/// the earliest resource that failed, as `LogicalId: reason`.
/// events are returned newest first.
pub fn first_failure(events: &[StackEvent]) -> Option<String> {
    events.iter().rev().find_map(|event| {
        let failed = event.resource_status().map(|s| s.as_str().ends_with("_FAILED")).unwrap_or(false);
        let reason = event.resource_status_reason()?;
        if !failed {
            return None;
        }
        Some(format!("{}: {reason}", event.logical_resource_id().unwrap_or("stack")))
    })
}

/// the cloudformation calls the deployer makes. `name_or_id` accepts both,
/// and only an id still finds a stack after it was deleted.
#[async_trait]
pub trait StackApi: Send + Sync {
    async fn describe(&self, name_or_id: &str) -> Result<Option<StackState>, StackError>;
    /// returns the stack id
    async fn create(&self, name: &str, body: &str) -> Result<String, StackError>;
    /// `Ok(None)` when the template and the stack are already the same
    async fn update(&self, name: &str, body: &str) -> Result<Option<String>, StackError>;
    async fn delete(&self, name_or_id: &str) -> Result<(), StackError>;
    async fn failure_reason(&self, stack_id: &str) -> Result<Option<String>, StackError>;
}

pub struct CloudFormationApi {
    client: Client,
}

impl CloudFormationApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn sdk_err<E: std::error::Error>(e: E) -> StackError {
    StackError::Sdk(format!("{}", DisplayErrorContext(&e)))
}

#[async_trait]
impl StackApi for CloudFormationApi {
    async fn describe(&self, name_or_id: &str) -> Result<Option<StackState>, StackError> {
        match self.client.describe_stacks().stack_name(name_or_id).send().await {
            Ok(d) => Ok(d.stacks().first().and_then(StackState::from_stack)),
            Err(e) => {
                let e_str = format!("{}", DisplayErrorContext(&e));
                if is_missing_stack_message(&e_str) {
                    return Ok(None);
                }
                Err(StackError::Sdk(e_str))
            }
        }
    }

    async fn create(&self, name: &str, body: &str) -> Result<String, StackError> {
        let out = self.client
            .create_stack()
            .on_failure(OnFailure::Delete)
            .capabilities(Capability::CapabilityNamedIam)
            .capabilities(Capability::CapabilityIam)
            .stack_name(name)
            .template_body(body)
            .send()
            .await
            .map_err(sdk_err)?;
        Ok(out.stack_id().unwrap_or(name).to_string())
    }

    async fn update(&self, name: &str, body: &str) -> Result<Option<String>, StackError> {
        let res = self.client
            .update_stack()
            .capabilities(Capability::CapabilityNamedIam)
            .capabilities(Capability::CapabilityIam)
            .stack_name(name)
            .template_body(body)
            .send()
            .await;
        match res {
            Ok(out) => Ok(Some(out.stack_id().unwrap_or(name).to_string())),
            Err(e) => {
                let e_str = format!("{}", DisplayErrorContext(&e));
                if is_no_update_message(&e_str) {
                    return Ok(None);
                }
                Err(StackError::Sdk(e_str))
            }
        }
    }

    async fn delete(&self, name_or_id: &str) -> Result<(), StackError> {
        self.client
            .delete_stack()
            .stack_name(name_or_id)
            .send()
            .await
            .map_err(sdk_err)?;
        Ok(())
    }

    async fn failure_reason(&self, stack_id: &str) -> Result<Option<String>, StackError> {
        let out = self.client
            .describe_stack_events()
            .stack_name(stack_id)
            .send()
            .await
            .map_err(sdk_err)?;
        Ok(first_failure(out.stack_events()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackChange {
    /// carries the stack id to poll
    Created(String),
    Updated(String),
    Unchanged,
}

pub struct StackDeployer<A> {
    api: A,
    poll_interval: Duration,
}

impl StackDeployer<CloudFormationApi> {
    pub async fn from_env(region: &str) -> Self {
        let shared_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;
        Self::new(CloudFormationApi::new(Client::new(&shared_config)))
    }
}

impl<A: StackApi> StackDeployer<A> {
    pub fn new(api: A) -> Self {
        Self { api, poll_interval: Duration::from_millis(2000) }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// submits the template and waits until the stack settles. returns the
    /// stack outputs.
    pub async fn deploy(&self, stack_name: &str, template: &SavedTemplate) -> Result<HashMap<String, String>, StackError> {
        // we make it pretty so if a user needs to look at the stack in Cfn console, it looks nice
        let template_body = serde_json::to_string_pretty(template)?;
        info!(stack = stack_name, resources = template.resources.len(), "deploying stack");
        match self.create_or_update_stack(stack_name, &template_body).await? {
            StackChange::Unchanged => {
                info!(stack = stack_name, "no changes to deploy");
                self.outputs(stack_name).await
            }
            StackChange::Created(stack_id) | StackChange::Updated(stack_id) => {
                let outputs = self.wait_for_output(stack_name, &stack_id).await?;
                info!(stack = stack_name, "stack is ready");
                Ok(outputs)
            }
        }
    }

    /// outputs of an existing, settled stack
    pub async fn outputs(&self, stack_name: &str) -> Result<HashMap<String, String>, StackError> {
        match self.api.describe(stack_name).await? {
            Some(state) => Ok(state.outputs),
            None => Err(StackError::NotFound(stack_name.to_string())),
        }
    }

    pub async fn destroy(&self, stack_name: &str) -> Result<(), StackError> {
        if self.api.describe(stack_name).await?.is_none() {
            warn!(stack = stack_name, "stack does not exist, nothing to delete");
            return Ok(());
        }
        info!(stack = stack_name, "deleting stack");
        self.delete_and_wait(stack_name).await
    }

    /// polls by id so a create that was rolled back and deleted can still be
    /// described and explained.
    pub async fn wait_for_output(&self, stack_name: &str, stack_id: &str) -> Result<HashMap<String, String>, StackError> {
        loop {
            tokio::time::sleep(self.poll_interval).await;
            let state = match self.api.describe(stack_id).await? {
                Some(state) => state,
                None => {
                    let reason = self.explain_failure(stack_id, None).await;
                    return Err(StackError::Failed { stack: stack_name.to_string(), reason });
                }
            };
            match classify_status(&state.status) {
                StackProgress::Complete => return Ok(state.outputs),
                StackProgress::InProgress => {
                    debug!(stack = stack_name, status = state.status.as_str(), "waiting for stack");
                }
                StackProgress::Failed => {
                    let reason = self.explain_failure(stack_id, state.reason.as_deref()).await;
                    return Err(StackError::Failed {
                        stack: stack_name.to_string(),
                        reason: format!("{}: {reason}", state.status.as_str()),
                    });
                }
            }
        }
    }

    /// the first failed resource event, falling back to the stack status reason
    async fn explain_failure(&self, stack_id: &str, status_reason: Option<&str>) -> String {
        match self.api.failure_reason(stack_id).await {
            Ok(Some(reason)) => return reason,
            Ok(None) => {}
            Err(e) => warn!(stack = stack_id, "failed to read stack events: {e}"),
        }
        status_reason.unwrap_or("Failed to get stack failure reason").to_string()
    }

    pub async fn create_or_update_stack(&self, name: &str, body: &str) -> Result<StackChange, StackError> {
        let existing = match self.api.describe(name).await? {
            Some(state) => state,
            None => return self.create_stack(name, body).await,
        };
        // a stack whose first create failed can only be deleted
        if existing.status == StackStatus::RollbackComplete {
            warn!(stack = name, "stack is in ROLLBACK_COMPLETE, deleting it before creating again");
            self.delete_and_wait(name).await?;
            return self.create_stack(name, body).await;
        }
        info!(stack = name, "updating stack");
        Ok(match self.api.update(name, body).await? {
            Some(stack_id) => StackChange::Updated(stack_id),
            None => StackChange::Unchanged,
        })
    }

    async fn create_stack(&self, name: &str, body: &str) -> Result<StackChange, StackError> {
        info!(stack = name, "creating stack");
        Ok(StackChange::Created(self.api.create(name, body).await?))
    }

    async fn delete_and_wait(&self, name: &str) -> Result<(), StackError> {
        self.api.delete(name).await?;
        loop {
            tokio::time::sleep(self.poll_interval).await;
            let state = match self.api.describe(name).await? {
                Some(state) => state,
                None => return Ok(()),
            };
            match &state.status {
                StackStatus::DeleteComplete => return Ok(()),
                StackStatus::DeleteFailed => {
                    let reason = self.explain_failure(&state.stack_id, state.reason.as_deref()).await;
                    return Err(StackError::Failed { stack: name.to_string(), reason });
                }
                status => debug!(stack = name, status = status.as_str(), "waiting for delete"),
            }
        }
    }
}
