//! Message context and lifecycle.
//!
//! A [`MessageContext`] wraps an inbound or outbound business message: the
//! raw body, the metadata resolved from the message-type registry, the
//! activity linkage, and the message status. It drives the message through
//! store/queue → complete/fail/suspend against the persistence collaborator.
//!
//! One context is processed by one logical worker at a time; concurrent
//! mutation of a single instance is not a supported use case.

use std::sync::Arc;

use crate::activity::{Activity, CreditUserActivity};
use crate::config::Configuration;
use crate::error::{FrameworkError, Result};
use crate::format::{MessageFormatType, MessageFormatter};
use crate::msginfo::{MessageInfo, MessageInfoRegistry};
use crate::persistence::{Parameter, ProcedureExecutor, Value, output_value};

pub const STORE_MESSAGE: &str = "msg_store_message";
pub const QUEUE_MESSAGE: &str = "msg_queue_message";
pub const STATUS_MESSAGE: &str = "msg_status_message";
pub const STATUS_MESSAGE_AS_SUSPENDED: &str = "msg_status_message_as_suspended";
pub const UPDATE_JOB_STEP_STATUS: &str = "msg_update_job_step_status";
pub const UPDATE_MESSAGE_APPLICATION_ID: &str = "msg_update_message_application_id";
pub const SET_INSTANCE_DATA: &str = "msg_set_instance_data";
pub const GET_INSTANCE_DATA: &str = "msg_get_instance_data";
pub const GET_INSTANCE_DATA_BY_ACTIVITY_ID: &str = "msg_get_instance_data_by_activity_id";
pub const GET_INTERFACE_TYPE_ATTRIBUTES: &str = "common_get_interface_type_attributes";

/// Message processing outcome. Not freely settable: transitions happen only
/// through the dedicated operations, which also persist the change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    Completed,
    Failed,
    SetupFailure,
    Suspended,
}

/// How the message entered persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryMode {
    /// Synchronous processing path.
    Stored,
    /// Asynchronous queue path.
    Queued,
}

/// Collaborators shared by every message context of a process.
pub struct MessageServices {
    pub executor: Arc<dyn ProcedureExecutor>,
    pub registry: Arc<dyn MessageInfoRegistry>,
    pub formatter: Arc<dyn MessageFormatter>,
    pub configuration: Arc<Configuration>,
}

#[derive(Clone)]
pub struct MessageContext {
    services: Arc<MessageServices>,
    msg_info: Option<MessageInfo>,
    msg_body: String,
    /// Payload without the envelope; empty means "not derived yet".
    msg_content: String,
    instance_data: Option<String>,
    message_id: String,
    activity_id: String,
    user_id: String,
    message_nbr: i32,
    company_nbr: i32,
    application_id: i32,
    status: Option<MessageStatus>,
    entry: Option<EntryMode>,
    interface_type: String,
    interface_test_mode: bool,
    interface_test_lookup_key: String,
    interface_test_lookup_key_size: i32,
    interface_test_lookup_delay_ms: i32,
    schema_name: String,
}

impl MessageContext {
    /// Create a context for a given message type and body.
    ///
    /// Resolves [`MessageInfo`] through the registry and the interface test
    /// attributes when the message type declares an `InterfaceType`
    /// attribute. Pass zero for an unknown company number or application ID.
    pub fn new(
        services: Arc<MessageServices>,
        message_type: &str,
        message_body: &str,
        company_nbr: i32,
        application_id: i32,
    ) -> Result<Self> {
        Self::build(services, message_type, message_body, company_nbr, application_id).map_err(
            |e| {
                FrameworkError::persistence(
                    format!("failed to create message context for message type '{message_type}'"),
                    e,
                )
            },
        )
    }

    fn build(
        services: Arc<MessageServices>,
        message_type: &str,
        message_body: &str,
        company_nbr: i32,
        application_id: i32,
    ) -> Result<Self> {
        let msg_info = services.registry.build_message_info(message_type, message_body)?;
        let mut context = MessageContext {
            services,
            msg_info: Some(msg_info),
            msg_body: message_body.to_string(),
            msg_content: String::new(),
            instance_data: None,
            message_id: String::new(),
            activity_id: String::new(),
            user_id: String::new(),
            message_nbr: 0,
            company_nbr,
            application_id,
            status: None,
            entry: None,
            interface_type: String::new(),
            interface_test_mode: false,
            interface_test_lookup_key: String::new(),
            interface_test_lookup_key_size: 0,
            interface_test_lookup_delay_ms: 0,
            schema_name: String::new(),
        };
        context.resolve_test_attributes()?;
        Ok(context)
    }

    // Metadata proxied from the resolved MessageInfo; empty string when the
    // info is unresolved.

    pub fn message_type(&self) -> &str {
        self.msg_info.as_ref().map(|i| i.message_type.as_str()).unwrap_or("")
    }

    pub fn message_namespace(&self) -> &str {
        self.msg_info.as_ref().map(|i| i.message_namespace.as_str()).unwrap_or("")
    }

    pub fn message_schema_path(&self) -> &str {
        self.msg_info.as_ref().map(|i| i.message_schema_path.as_str()).unwrap_or("")
    }

    pub fn error_type(&self) -> &str {
        self.msg_info.as_ref().map(|i| i.error_type.as_str()).unwrap_or("")
    }

    pub fn response_type(&self) -> &str {
        self.msg_info.as_ref().map(|i| i.response_type.as_str()).unwrap_or("")
    }

    pub fn message_attribute(&self, name: &str) -> &str {
        self.msg_info.as_ref().map(|i| i.attribute(name)).unwrap_or("")
    }

    pub fn message_info(&self) -> Option<&MessageInfo> {
        self.msg_info.as_ref()
    }

    /// A message is one-way exactly when its type has no response type.
    pub fn one_way(&self) -> bool {
        self.response_type().is_empty()
    }

    pub fn message_format_type(&self) -> MessageFormatType {
        self.services.formatter.format_type(&self.msg_body)
    }

    pub fn message_body(&self) -> &str {
        &self.msg_body
    }

    /// Replace the raw body. The derived content cache is invalidated and
    /// recomputed lazily on the next [`MessageContext::message_content`] call.
    pub fn set_message_body(&mut self, message_body: &str) {
        self.msg_body = message_body.to_string();
        self.msg_content.clear();
    }

    /// The payload without the envelope, derived through the formatter on
    /// first access and cached.
    pub fn message_content(&mut self) -> Result<String> {
        if self.msg_content.is_empty() {
            self.msg_content = self.services.formatter.content_of(&self.msg_body)?;
        }
        Ok(self.msg_content.clone())
    }

    /// Replace the payload, re-serializing the body around it.
    pub fn set_message_content(&mut self, message_content: &str) -> Result<()> {
        self.msg_body = self
            .services
            .formatter
            .replace_content(&self.msg_body, message_content)?;
        self.msg_content = message_content.to_string();
        Ok(())
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn set_message_id(&mut self, message_id: &str) {
        self.message_id = message_id.to_string();
    }

    pub fn activity_id(&self) -> &str {
        &self.activity_id
    }

    pub fn set_activity_id(&mut self, activity_id: &str) {
        self.activity_id = activity_id.to_string();
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn set_user_id(&mut self, user_id: &str) {
        self.user_id = user_id.to_string();
    }

    /// Message number, available after the message is stored or queued.
    pub fn message_nbr(&self) -> i32 {
        self.message_nbr
    }

    pub fn company_nbr(&self) -> i32 {
        self.company_nbr
    }

    pub fn application_id(&self) -> i32 {
        self.application_id
    }

    pub fn message_status(&self) -> Option<MessageStatus> {
        self.status
    }

    pub fn interface_type(&self) -> &str {
        &self.interface_type
    }

    /// When true, the test response is fetched from the stub database
    /// instead of the live backend.
    pub fn interface_test_mode(&self) -> bool {
        self.interface_test_mode
    }

    pub fn interface_test_lookup_key(&self) -> &str {
        &self.interface_test_lookup_key
    }

    pub fn interface_test_lookup_key_size(&self) -> i32 {
        self.interface_test_lookup_key_size
    }

    pub fn interface_test_lookup_delay_ms(&self) -> i32 {
        self.interface_test_lookup_delay_ms
    }

    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    /// Persist the message for synchronous processing. Only consumed by the
    /// message proxy; asynchronous flows use [`MessageContext::queue_message`].
    pub fn store_message(&mut self) -> Result<()> {
        self.guard_entry()?;
        let scope = self.services.configuration.message_activity();
        let mut params = [
            Parameter::input("msgType", self.message_type()),
            Parameter::input("msgBody", self.msg_body.as_str()),
            Parameter::input("compNbr", self.company_nbr),
            Parameter::input("applicationId", self.application_id),
            Parameter::input("activityId", self.activity_id.as_str()),
            Parameter::input("msgId", self.message_id.as_str()),
            Parameter::input("msgSyncFlag", 1),
            Parameter::output("msgNbr"),
        ];
        self.services
            .executor
            .execute_non_query(&scope, STORE_MESSAGE, &mut params)
            .map_err(|e| {
                FrameworkError::persistence(
                    format!("failed to store message of type '{}'", self.message_type()),
                    e,
                )
            })?;
        self.message_nbr = output_value(&params, "msgNbr")?.as_i32()?;
        self.entry = Some(EntryMode::Stored);
        Ok(())
    }

    /// Persist the message for asynchronous processing, generating the
    /// message ID (and defaulting the activity ID to it) when unset.
    pub fn queue_message(&mut self) -> Result<()> {
        self.guard_entry()?;
        if self.message_id.is_empty() {
            self.message_id = uuid7::uuid7().to_string();
        }
        if self.activity_id.is_empty() {
            self.activity_id = self.message_id.clone();
        }
        let scope = self.services.configuration.message_activity();
        let mut params = [
            Parameter::input("msgType", self.message_type()),
            Parameter::input("msgBody", self.msg_body.as_str()),
            Parameter::input("compNbr", self.company_nbr),
            Parameter::input("applicationId", self.application_id),
            Parameter::input("activityId", self.activity_id.as_str()),
            Parameter::input("msgId", self.message_id.as_str()),
            Parameter::output("msgNbr"),
        ];
        self.services
            .executor
            .execute_non_query(&scope, QUEUE_MESSAGE, &mut params)
            .map_err(|e| {
                FrameworkError::persistence(
                    format!("failed to queue message of type '{}'", self.message_type()),
                    e,
                )
            })?;
        self.message_nbr = output_value(&params, "msgNbr")?.as_i32()?;
        self.entry = Some(EntryMode::Queued);
        Ok(())
    }

    fn guard_entry(&self) -> Result<()> {
        match self.entry {
            None => Ok(()),
            Some(EntryMode::Stored) => Err(FrameworkError::Validation(
                "message has already been stored; store and queue are mutually exclusive entry points"
                    .to_string(),
            )),
            Some(EntryMode::Queued) => Err(FrameworkError::Validation(
                "message has already been queued; store and queue are mutually exclusive entry points"
                    .to_string(),
            )),
        }
    }

    /// Persist a terminal message status. Suspension must go through
    /// [`MessageContext::set_suspend_status`]; passing it (or any unmapped
    /// status) here is a programming error and fails before touching the
    /// database.
    pub fn set_message_status(&mut self, message_status: MessageStatus) -> Result<()> {
        let code = match message_status {
            MessageStatus::Completed => "C",
            MessageStatus::Failed => "E",
            MessageStatus::SetupFailure => "F",
            other => {
                return Err(FrameworkError::Validation(format!(
                    "invalid action: cannot set message status to '{other:?}' through MessageContext"
                )));
            }
        };
        let scope = self.services.configuration.message_activity();
        let mut params = [
            Parameter::input("msgNbr", self.message_nbr),
            Parameter::input("msgStatus", code),
            Parameter::input("companyNbr", self.company_nbr),
            Parameter::input("applicationId", self.application_id),
        ];
        self.services
            .executor
            .execute_non_query(&scope, STATUS_MESSAGE, &mut params)
            .map_err(|e| {
                FrameworkError::persistence(
                    format!(
                        "failed to update message status for message type '{}', message id '{}'",
                        self.message_type(),
                        self.message_id
                    ),
                    e,
                )
            })?;
        self.status = Some(message_status);
        Ok(())
    }

    /// Persist the status of the job-queue step this message represents,
    /// keyed by message ID (the job step ID) and carrying the message body
    /// as the job document.
    pub fn set_job_step_status(&mut self, message_status: MessageStatus) -> Result<()> {
        let code = match message_status {
            MessageStatus::Completed => "C",
            MessageStatus::Failed => "E",
            other => {
                return Err(FrameworkError::Validation(format!(
                    "invalid action: cannot set job step status to '{other:?}' through MessageContext"
                )));
            }
        };
        let scope = self.services.configuration.message_activity();
        let mut params = [
            Parameter::input("jobStepId", self.message_id.as_str()),
            Parameter::input("jobStepStatus", code),
            Parameter::input("jobDocument", self.msg_body.as_str()),
        ];
        self.services
            .executor
            .execute_non_query(&scope, UPDATE_JOB_STEP_STATUS, &mut params)
            .map_err(|e| {
                FrameworkError::persistence(
                    format!(
                        "failed to update step status in job queue (JobStepType='{}', JobStepId='{}')",
                        self.message_type(),
                        self.message_id
                    ),
                    e,
                )
            })
    }

    /// Suspend the message with a retry policy and return the retry count
    /// reported by persistence, letting the caller detect
    /// max-retries-exceeded.
    pub fn set_suspend_status(&mut self, retry_interval: i32, retry_max_count: i32) -> Result<i32> {
        let scope = self.services.configuration.message_activity();
        let mut params = [
            Parameter::input("msgNbr", self.message_nbr),
            Parameter::input("msgRetryInterval", retry_interval),
            Parameter::input("msgRetryMaxCount", retry_max_count),
        ];
        let retry_count = self
            .services
            .executor
            .execute_scalar(&scope, STATUS_MESSAGE_AS_SUSPENDED, &mut params)
            .map_err(|e| {
                FrameworkError::persistence(
                    format!(
                        "failed to suspend message of type '{}', message id '{}'",
                        self.message_type(),
                        self.message_id
                    ),
                    e,
                )
            })?
            .ok_or_else(|| {
                FrameworkError::Validation(
                    "message suspension did not report a retry count".to_string(),
                )
            })?
            .as_i32()?;
        self.status = Some(MessageStatus::Suspended);
        Ok(retry_count)
    }

    /// Assign the application ID. The ID starts at zero ("unknown") and may
    /// be set exactly once to a positive value; re-assigning the same value
    /// is a no-op that skips persistence.
    pub fn set_application_id(&mut self, application_id: i32) -> Result<()> {
        if self.application_id == application_id {
            return Ok(());
        }
        if self.application_id > 0 {
            return Err(FrameworkError::Validation(
                "not allowed to modify the application id once the message has a positive application id"
                    .to_string(),
            ));
        }
        if application_id <= 0 {
            return Err(FrameworkError::Validation(
                "application id must be a positive value".to_string(),
            ));
        }
        self.application_id = application_id;
        let scope = self.services.configuration.message_activity();
        let mut params = [
            Parameter::input("msgNbr", self.message_nbr),
            Parameter::input("applicationId", self.application_id),
        ];
        self.services
            .executor
            .execute_non_query(&scope, UPDATE_MESSAGE_APPLICATION_ID, &mut params)
            .map_err(|e| {
                FrameworkError::persistence(
                    format!(
                        "failed to set the application id for message number '{}'",
                        self.message_nbr
                    ),
                    e,
                )
            })
    }

    /// Update the instance data, writing through the cache. The write is
    /// skipped when the new value equals the cached one.
    pub fn set_instance_data(&mut self, instance_data: &str) -> Result<()> {
        if self.instance_data.as_deref() == Some(instance_data) {
            return Ok(());
        }
        let scope = self.services.configuration.message_activity();
        let mut params = [
            Parameter::input("msgNbr", self.message_nbr),
            Parameter::input("instanceData", instance_data),
        ];
        self.services
            .executor
            .execute_non_query(&scope, SET_INSTANCE_DATA, &mut params)
            .map_err(|e| {
                FrameworkError::persistence(
                    format!(
                        "failed to set message instance data for message number '{}'",
                        self.message_nbr
                    ),
                    e,
                )
            })?;
        self.instance_data = Some(instance_data.to_string());
        Ok(())
    }

    /// Instance data for this message, fetched by message number on first
    /// access and cached.
    pub fn get_instance_data(&mut self) -> Result<Option<String>> {
        if self.instance_data.is_none() {
            let mut params = [Parameter::input("msgNbr", self.message_nbr)];
            let scope = self.services.configuration.message_activity();
            let scalar = self
                .services
                .executor
                .execute_scalar(&scope, GET_INSTANCE_DATA, &mut params)
                .map_err(|e| {
                    FrameworkError::persistence(
                        format!(
                            "failed to get message instance data for message number '{}'",
                            self.message_nbr
                        ),
                        e,
                    )
                })?;
            if let Some(value) = scalar
                && value != Value::Null
            {
                self.instance_data = Some(value.as_text());
            }
        }
        Ok(self.instance_data.clone())
    }

    /// The last initialized instance data related to this context's activity
    /// ID, for workflow state carry-over across messages of one activity.
    pub fn get_activity_related_instance_data(&mut self) -> Result<Option<String>> {
        if self.instance_data.is_none() {
            let mut params = [Parameter::input("msgActivityId", self.activity_id.as_str())];
            let scope = self.services.configuration.message_activity();
            let scalar = self
                .services
                .executor
                .execute_scalar(&scope, GET_INSTANCE_DATA_BY_ACTIVITY_ID, &mut params)
                .map_err(|e| {
                    FrameworkError::persistence(
                        format!(
                            "failed to get message instance data for activity id '{}'",
                            self.activity_id
                        ),
                        e,
                    )
                })?;
            if let Some(value) = scalar
                && value != Value::Null
            {
                self.instance_data = Some(value.as_text());
            }
        }
        Ok(self.instance_data.clone())
    }

    /// Rebuild a [`CreditUserActivity`] from the scalar activity fields this
    /// context carries. `None` when the company number is unknown.
    pub fn credit_user_activity(&self) -> Result<Option<CreditUserActivity>> {
        if self.company_nbr <= 0 {
            return Ok(None);
        }
        let mut activity = CreditUserActivity::new(
            self.services.configuration.domain_name(),
            self.company_nbr,
            &self.user_id,
        )?;
        if !self.activity_id.is_empty() {
            activity.core.set_activity_id(&self.activity_id)?;
        }
        Ok(Some(activity))
    }

    /// Resolve the interface test attributes when the message type declares
    /// an `InterfaceType` attribute. Invoked once at construction.
    fn resolve_test_attributes(&mut self) -> Result<()> {
        let interface_type = self.message_attribute("InterfaceType").to_string();
        if interface_type.is_empty() {
            return Ok(());
        }
        self.interface_type = interface_type;
        // Fail loudly so every caller that forgets to set the company number
        // is found.
        if self.company_nbr == 0 {
            return Err(FrameworkError::Configuration(
                "cannot resolve interface type parameters because the company number is not set"
                    .to_string(),
            ));
        }
        let activity = self.credit_user_activity()?.ok_or_else(|| {
            FrameworkError::Configuration(
                "cannot resolve interface type parameters without a credit user activity"
                    .to_string(),
            )
        })?;
        let scope = Activity::CreditUser(activity);
        let mut params = [
            Parameter::input("compNbr", self.company_nbr),
            Parameter::input("interfaceType", self.interface_type.as_str()),
        ];
        let rows = self
            .services
            .executor
            .execute_rows(&scope, GET_INTERFACE_TYPE_ATTRIBUTES, &mut params)?;
        let Some(row) = rows.first() else {
            return Err(FrameworkError::Configuration(format!(
                "interface attributes not found for interface type '{}' in company '{}' for message type '{}'",
                self.interface_type,
                self.company_nbr,
                self.message_type()
            )));
        };
        self.schema_name = row.require("schema_name")?.as_text();
        self.interface_test_lookup_key = row.require("test_lookup_key")?.as_text();
        self.interface_test_lookup_key_size = row.require("test_lookup_key_size")?.as_i32()?;
        self.interface_test_lookup_delay_ms = row.require("test_lookup_delay_ms")?.as_i32()?;
        if row.require("test_mode")?.as_text() == "1" {
            self.interface_test_mode = true;
        }
        if self.interface_test_lookup_key.is_empty() {
            return Err(FrameworkError::Configuration(format!(
                "TestLookupKey attribute not found for message type '{}'",
                self.message_type()
            )));
        }
        Ok(())
    }

    /// Construct the context for the response message. `None` when the
    /// response body is empty or the message is one-way.
    pub fn create_response_message_context(
        &self,
        response_message: &str,
    ) -> Result<Option<MessageContext>> {
        if response_message.is_empty() || self.one_way() {
            return Ok(None);
        }
        let response_type = self.response_type().to_string();
        let mut response = MessageContext::new(
            self.services.clone(),
            &response_type,
            response_message,
            self.company_nbr,
            self.application_id,
        )
        .map_err(|e| {
            FrameworkError::persistence(
                "failed to construct the message context for the response",
                e,
            )
        })?;
        response.activity_id = self.activity_id.clone();
        response.user_id = self.user_id.clone();
        Ok(Some(response))
    }
}

/// A worker component executed by the process adapter: one transaction per
/// request message, optionally yielding a response context.
pub trait Worker {
    fn execute(&self, message_context: &mut MessageContext) -> Result<Option<MessageContext>>;
}
