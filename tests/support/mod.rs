//! Shared test doubles: a scripted procedure executor, an in-memory message
//! type registry, an envelope formatter and a counting impersonator.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use credit_framework::activity::Activity;
use credit_framework::config::{AppSettings, Configuration};
use credit_framework::error::{FrameworkError, Result};
use credit_framework::format::{MessageFormatType, MessageFormatter};
use credit_framework::message::MessageServices;
use credit_framework::msginfo::{MessageInfo, MessageInfoRegistry};
use credit_framework::persistence::{Direction, Parameter, ProcedureExecutor, Row, Value};
use credit_framework::security::Impersonator;
use credit_framework::trace::{LogSink, Tracer};

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub scope: String,
    pub procedure: String,
    pub params: Vec<(String, Value)>,
}

/// Procedure executor that records every call and replays scripted results
/// in FIFO order. Unscripted scalar calls return `None`, unscripted rowset
/// calls return no rows.
#[derive(Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<RecordedCall>>,
    scalars: Mutex<VecDeque<Option<Value>>>,
    rows: Mutex<VecDeque<Vec<Row>>>,
    statement_scalars: Mutex<VecDeque<Option<Value>>>,
    out_values: Mutex<HashMap<String, Value>>,
    fail_procedures: Mutex<HashSet<String>>,
}

impl RecordingExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(RecordingExecutor::default())
    }

    pub fn script_scalar(&self, value: Option<Value>) {
        self.scalars.lock().unwrap().push_back(value);
    }

    pub fn script_rows(&self, rows: Vec<Row>) {
        self.rows.lock().unwrap().push_back(rows);
    }

    pub fn script_statement_scalar(&self, value: Option<Value>) {
        self.statement_scalars.lock().unwrap().push_back(value);
    }

    /// Value assigned to a named output parameter on the next non-query call.
    pub fn set_output(&self, name: &str, value: Value) {
        self.out_values.lock().unwrap().insert(name.to_string(), value);
    }

    /// Make every call to the named procedure fail.
    pub fn fail_procedure(&self, procedure: &str) {
        self.fail_procedures.lock().unwrap().insert(procedure.to_string());
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_call(&self) -> RecordedCall {
        self.calls.lock().unwrap().last().cloned().expect("no calls recorded")
    }

    fn record(&self, scope: &Activity, procedure: &str, params: &[Parameter]) {
        self.calls.lock().unwrap().push(RecordedCall {
            scope: scope_label(scope),
            procedure: procedure.to_string(),
            params: params
                .iter()
                .map(|p| (p.name.clone(), p.value.clone()))
                .collect(),
        });
    }

    fn check_failure(&self, procedure: &str) -> Result<()> {
        if self.fail_procedures.lock().unwrap().contains(procedure) {
            return Err(FrameworkError::Validation(format!(
                "scripted failure in '{procedure}'"
            )));
        }
        Ok(())
    }
}

fn scope_label(scope: &Activity) -> String {
    match scope {
        Activity::Database(a) => a.database_name.clone(),
        Activity::CreditUser(a) => format!("company:{}", a.company_nbr),
        Activity::Vendor(a) => format!("vendor:{}", a.vendor_id),
    }
}

impl ProcedureExecutor for RecordingExecutor {
    fn execute_non_query(
        &self,
        scope: &Activity,
        procedure: &str,
        params: &mut [Parameter],
    ) -> Result<()> {
        self.check_failure(procedure)?;
        let outputs = self.out_values.lock().unwrap();
        for param in params
            .iter_mut()
            .filter(|p| p.direction == Direction::Output)
        {
            param.value = outputs.get(&param.name).cloned().unwrap_or(Value::Int(0));
        }
        drop(outputs);
        self.record(scope, procedure, params);
        Ok(())
    }

    fn execute_scalar(
        &self,
        scope: &Activity,
        procedure: &str,
        params: &mut [Parameter],
    ) -> Result<Option<Value>> {
        self.check_failure(procedure)?;
        self.record(scope, procedure, params);
        Ok(self.scalars.lock().unwrap().pop_front().flatten())
    }

    fn execute_rows(
        &self,
        scope: &Activity,
        procedure: &str,
        params: &mut [Parameter],
    ) -> Result<Vec<Row>> {
        self.check_failure(procedure)?;
        self.record(scope, procedure, params);
        Ok(self.rows.lock().unwrap().pop_front().unwrap_or_default())
    }

    fn execute_statement_scalar(&self, scope: &Activity, statement: &str) -> Result<Option<Value>> {
        self.record(scope, statement, &[]);
        Ok(self.statement_scalars.lock().unwrap().pop_front().flatten())
    }
}

/// In-memory message type registry.
#[derive(Default)]
pub struct MockRegistry {
    infos: HashMap<String, MessageInfo>,
}

impl MockRegistry {
    pub fn new() -> Self {
        MockRegistry::default()
    }

    pub fn with(mut self, info: MessageInfo) -> Self {
        self.infos.insert(info.message_type.clone(), info);
        self
    }
}

impl MessageInfoRegistry for MockRegistry {
    fn build_message_info(&self, message_type: &str, _message_body: &str) -> Result<MessageInfo> {
        self.infos.get(message_type).cloned().ok_or_else(|| {
            FrameworkError::Configuration(format!(
                "message type '{message_type}' is not registered"
            ))
        })
    }
}

/// Formatter with a trivial `ENV[...]` envelope convention: a body of
/// `ENV[content]` is enveloped, anything else is bare content.
pub struct EnvelopeFormatter;

impl EnvelopeFormatter {
    fn enveloped(body: &str) -> Option<&str> {
        body.strip_prefix("ENV[")?.strip_suffix("]")
    }
}

impl MessageFormatter for EnvelopeFormatter {
    fn format_type(&self, message_body: &str) -> MessageFormatType {
        if Self::enveloped(message_body).is_some() {
            MessageFormatType::Soap
        } else if message_body.starts_with('<') {
            MessageFormatType::Xml
        } else {
            MessageFormatType::None
        }
    }

    fn content_of(&self, message_body: &str) -> Result<String> {
        Ok(Self::enveloped(message_body)
            .unwrap_or(message_body)
            .to_string())
    }

    fn replace_content(&self, message_body: &str, message_content: &str) -> Result<String> {
        if Self::enveloped(message_body).is_some() {
            Ok(format!("ENV[{message_content}]"))
        } else {
            Ok(message_content.to_string())
        }
    }
}

/// Impersonation provider that records logons instead of switching identity.
#[derive(Default)]
pub struct MockImpersonator {
    pub web_caller: bool,
    pub refuse_logon: bool,
    pub logons: Mutex<Vec<String>>,
    pub undos: AtomicUsize,
}

impl MockImpersonator {
    pub fn logon_count(&self) -> usize {
        self.logons.lock().unwrap().len()
    }

    pub fn undo_count(&self) -> usize {
        self.undos.load(Ordering::SeqCst)
    }
}

impl Impersonator for MockImpersonator {
    fn has_user_context(&self) -> bool {
        self.web_caller
    }

    fn logon(&self, user_id: &str, domain: &str, _password: &str) -> Result<()> {
        if self.refuse_logon {
            return Err(FrameworkError::Access(format!(
                "logon refused for '{domain}\\{user_id}'"
            )));
        }
        self.logons
            .lock()
            .unwrap()
            .push(format!("{domain}\\{user_id}"));
        Ok(())
    }

    fn undo(&self) {
        self.undos.fetch_add(1, Ordering::SeqCst);
    }
}

const DOMAIN_CONFIG: &str = r#"<Domain>
  <Parameters>
    <RetryLimit>3</RetryLimit>
    <Company0Credentials>
      <UserId>svc_framework</UserId>
      <Password>secret</Password>
      <Domain>CREDIT</Domain>
    </Company0Credentials>
    <Company5Credentials>
      <UserId>svc_five</UserId>
      <Password>secret</Password>
      <Domain>CREDIT</Domain>
    </Company5Credentials>
    <Company7Credentials>
      <UserId></UserId>
      <Password></Password>
      <Domain>CREDIT</Domain>
    </Company7Credentials>
  </Parameters>
</Domain>"#;

/// Configuration rooted in a temp directory with a canned Domain.config:
/// company 0 and 5 have service credentials, company 7 has impersonation
/// disabled.
pub fn test_configuration(root: &Path) -> Arc<Configuration> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    std::fs::create_dir_all(root.join("config")).unwrap();
    std::fs::create_dir_all(root.join("log")).unwrap();
    std::fs::write(root.join("config").join("Domain.config"), DOMAIN_CONFIG).unwrap();
    let settings = AppSettings::from_pairs(&[
        ("DomainName", "CREDIT"),
        ("ProductName", "CreditSuite"),
        ("PhysicalRoot", root.to_str().unwrap()),
    ])
    .unwrap();
    let tracer = Arc::new(Tracer::new(
        "CreditSuite",
        "CREDIT",
        root.join("log"),
        Box::new(LogSink),
        true,
    ));
    Arc::new(Configuration::initialize(&settings, tracer).unwrap())
}

pub fn build_services(
    root: &Path,
    executor: Arc<RecordingExecutor>,
    registry: MockRegistry,
) -> Arc<MessageServices> {
    Arc::new(MessageServices {
        executor,
        registry: Arc::new(registry),
        formatter: Arc::new(EnvelopeFormatter),
        configuration: test_configuration(root),
    })
}

/// Registered message info with the conventional namespace and schema path.
pub fn message_info(message_type: &str, response_type: &str) -> MessageInfo {
    let mut info = MessageInfo::new(message_type);
    info.message_namespace = format!("urn:credit:{message_type}");
    info.message_schema_path = format!("schema/{message_type}.xsd");
    info.error_type = "CreditError".to_string();
    info.response_type = response_type.to_string();
    info
}
