//! Configuration services.
//!
//! [`Configuration`] is constructed once at process start from an
//! [`AppSettings`] source and passed by reference to collaborators; there is
//! no global singleton. It owns the domain parameter map and the per-company
//! credentials cache, both read-mostly and refreshable via
//! [`Configuration::refresh_cache`].

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::activity::{Activity, DatabaseActivity};
use crate::error::{FrameworkError, Result};
use crate::trace::{EVENT_CONFIG_NODE_MISSING, EVENT_CREDENTIALS_INCOMPLETE, EVENT_INIT_FAILURE, Tracer};

/// Global settings source (system/web config equivalent), layered from a
/// settings file and the process environment.
pub struct AppSettings {
    inner: config::Config,
}

impl AppSettings {
    /// Load settings from a file, with `CREDIT_FRAMEWORK_*` environment
    /// variables layered on top.
    pub fn load(path: &Path) -> Result<Self> {
        let inner = config::Config::builder()
            .add_source(config::File::from(path.to_path_buf()))
            .add_source(config::Environment::with_prefix("CREDIT_FRAMEWORK"))
            .build()
            .map_err(|e| {
                FrameworkError::Configuration(format!(
                    "failed to load settings from '{}': {e}",
                    path.display()
                ))
            })?;
        Ok(AppSettings { inner })
    }

    /// Build settings from literal pairs. Used by composition roots that
    /// already resolved their settings, and by tests.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Result<Self> {
        let mut builder = config::Config::builder();
        for (key, value) in pairs {
            builder = builder.set_override(*key, *value).map_err(|e| {
                FrameworkError::Configuration(format!("cannot set setting '{key}': {e}"))
            })?;
        }
        let inner = builder.build().map_err(|e| {
            FrameworkError::Configuration(format!("failed to build settings: {e}"))
        })?;
        Ok(AppSettings { inner })
    }

    /// Read a global setting. Fails if the key is absent or empty.
    pub fn global_setting(&self, name: &str) -> Result<String> {
        let value = self.inner.get_string(name).map_err(|_| {
            FrameworkError::Configuration(format!(
                "application setting '{name}' is missing from the settings source"
            ))
        })?;
        if value.is_empty() {
            return Err(FrameworkError::Configuration(format!(
                "invalid/empty application setting '{name}'"
            )));
        }
        Ok(value)
    }
}

/// Database credentials for a given company and domain, used to scope
/// impersonated database access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyCredentials {
    pub domain: String,
    pub user_id: String,
    pub password: String,
    /// A cache hit is trusted; a freshly loaded credential must be validated
    /// against the live database session.
    pub from_cache: bool,
}

/// Process-wide configuration, built once at startup.
pub struct Configuration {
    tracer: Arc<Tracer>,
    domain_name: String,
    product_name: String,
    physical_root: PathBuf,
    message_activity: DatabaseActivity,
    parameters: Mutex<HashMap<String, String>>,
    credentials: Mutex<HashMap<String, CompanyCredentials>>,
}

impl Configuration {
    /// Initialize from the settings source, tracing the outcome. The
    /// initialization failure entry is the one place allowed to trace before
    /// the application is fully up, so trace failures are ignored here.
    pub fn initialize(settings: &AppSettings, tracer: Arc<Tracer>) -> Result<Self> {
        match Self::build(settings, tracer.clone()) {
            Ok(configuration) => {
                tracer
                    .write_info(&format!(
                        "application '{}' initialized for domain '{}' under '{}'",
                        configuration.product_name,
                        configuration.domain_name,
                        configuration.physical_root.display()
                    ))
                    .ok();
                Ok(configuration)
            }
            Err(e) => {
                tracer
                    .write_error(
                        EVENT_INIT_FAILURE,
                        &format!("failed to initialize application: {e}"),
                    )
                    .ok();
                Err(e)
            }
        }
    }

    fn build(settings: &AppSettings, tracer: Arc<Tracer>) -> Result<Self> {
        let domain_name = settings.global_setting("DomainName")?;
        let product_name = settings.global_setting("ProductName")?;
        let physical_root = PathBuf::from(settings.global_setting("PhysicalRoot")?);
        if !physical_root.is_dir() {
            return Err(FrameworkError::Configuration(format!(
                "setting 'PhysicalRoot' points to a path '{}' that does not exist",
                physical_root.display()
            )));
        }
        let message_activity = DatabaseActivity::new(&domain_name, "MESSAGE")?;
        let domain_config = physical_root.join("config").join("Domain.config");
        let parameters = load_parameters(&domain_config)?;
        Ok(Configuration {
            tracer,
            domain_name,
            product_name,
            physical_root,
            message_activity,
            parameters: Mutex::new(parameters),
            credentials: Mutex::new(HashMap::new()),
        })
    }

    pub fn domain_name(&self) -> &str {
        &self.domain_name
    }

    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    pub fn physical_root(&self) -> &Path {
        &self.physical_root
    }

    pub fn config_path(&self) -> PathBuf {
        self.physical_root.join("config")
    }

    pub fn domain_config_file(&self) -> PathBuf {
        self.config_path().join("Domain.config")
    }

    pub fn log_path(&self) -> PathBuf {
        self.physical_root.join("log")
    }

    pub fn working_path(&self) -> PathBuf {
        self.physical_root.join("working")
    }

    pub fn job_path(&self) -> PathBuf {
        self.physical_root.join("job")
    }

    pub fn schema_path(&self) -> PathBuf {
        self.physical_root.join("schema")
    }

    pub fn trace_path(&self) -> PathBuf {
        self.physical_root.join("trace")
    }

    pub fn format_path(&self) -> PathBuf {
        self.physical_root.join("fmt")
    }

    /// Activity scoping calls against the domain's message database.
    pub fn message_activity(&self) -> Activity {
        Activity::Database(self.message_activity.clone())
    }

    /// Domain parameter value. A missing key is a configuration error.
    pub fn get_parameter(&self, key: &str) -> Result<String> {
        self.parameters
            .lock()
            .expect("parameter cache poisoned")
            .get(key)
            .cloned()
            .ok_or_else(|| {
                FrameworkError::Configuration(format!(
                    "parameter '{key}' is missing from the domain config"
                ))
            })
    }

    pub fn get_parameter_as_integer(&self, key: &str) -> Result<i32> {
        let value = self.get_parameter(key)?;
        value.trim().parse().map_err(|_| {
            FrameworkError::Configuration(format!(
                "failed to read parameter '{key}' value '{value}' as an integer"
            ))
        })
    }

    /// Add a domain parameter to the cache. Only used by test tooling.
    pub fn add_parameter(&self, key: &str, value: &str) {
        self.parameters
            .lock()
            .expect("parameter cache poisoned")
            .insert(key.to_string(), value.to_string());
    }

    /// Invalidate and re-populate the parameter cache from Domain.config and
    /// drop all cached credentials.
    pub fn refresh_cache(&self) -> Result<()> {
        let reloaded = load_parameters(&self.domain_config_file())?;
        *self.parameters.lock().expect("parameter cache poisoned") = reloaded;
        self.credentials
            .lock()
            .expect("credentials cache poisoned")
            .clear();
        Ok(())
    }

    /// Per-company/center module lookup from the retired module cache.
    pub fn get_module(&self, _credit_center_nbr: i32, _module_id: &str) -> Result<String> {
        Err(FrameworkError::NotImplemented(
            "module lookup is obsolete and needs to be refactored".to_string(),
        ))
    }

    /// Look up impersonation credentials for a company.
    ///
    /// Cache-first, keyed `Company{N}Credentials`; a miss parses Domain.config
    /// and caches the result with `from_cache = false`, a hit is returned with
    /// `from_cache = true`. An empty user ID means impersonation is disabled
    /// for that company and `None` is returned instead of an empty credential.
    pub fn get_credentials(&self, company_nbr: i32) -> Result<Option<CompanyCredentials>> {
        let lookup_key = format!("Company{company_nbr}Credentials");
        {
            let cache = self.credentials.lock().expect("credentials cache poisoned");
            if let Some(found) = cache.get(&lookup_key) {
                let mut credentials = found.clone();
                credentials.from_cache = true;
                return Ok(filter_disabled(credentials));
            }
        }

        let file = self.domain_config_file();
        let text = fs::read_to_string(&file).map_err(|e| {
            FrameworkError::Configuration(format!(
                "cannot read domain config file '{}': {e}",
                file.display()
            ))
        })?;
        let document = roxmltree::Document::parse(&text).map_err(|e| {
            FrameworkError::Configuration(format!(
                "malformed domain config file '{}': {e}",
                file.display()
            ))
        })?;
        let Some(node) = document
            .descendants()
            .find(|n| n.is_element() && n.has_tag_name(lookup_key.as_str()))
        else {
            let error = format!(
                "node '{lookup_key}' not found in domain config file '{}'",
                file.display()
            );
            self.tracer.write_error(EVENT_CONFIG_NODE_MISSING, &error).ok();
            return Err(FrameworkError::Configuration(error));
        };

        let child = |tag: &str| {
            node.children()
                .find(|n| n.is_element() && n.has_tag_name(tag))
                .map(|n| n.text().unwrap_or("").to_string())
        };
        let (Some(user_id), Some(password), Some(domain)) =
            (child("UserId"), child("Password"), child("Domain"))
        else {
            let error = format!(
                "UserId, Password, and/or Domain not defined for '{lookup_key}' in domain config file '{}'",
                file.display()
            );
            self.tracer
                .write_error(EVENT_CREDENTIALS_INCOMPLETE, &error)
                .ok();
            return Err(FrameworkError::Configuration(error));
        };

        let credentials = CompanyCredentials {
            domain,
            user_id,
            password,
            from_cache: false,
        };
        self.credentials
            .lock()
            .expect("credentials cache poisoned")
            .insert(lookup_key, credentials.clone());
        Ok(filter_disabled(credentials))
    }
}

/// Impersonation is disabled when the configured user ID is empty; callers
/// get "no credentials" rather than an empty-but-present object.
fn filter_disabled(credentials: CompanyCredentials) -> Option<CompanyCredentials> {
    if credentials.user_id.is_empty() {
        None
    } else {
        Some(credentials)
    }
}

/// Read the `<Parameters>` element of Domain.config into a map. Simple
/// text-only children become parameters; structured nodes (credentials) are
/// read separately on demand. A missing file yields an empty map.
fn load_parameters(file: &Path) -> Result<HashMap<String, String>> {
    if !file.is_file() {
        return Ok(HashMap::new());
    }
    let text = fs::read_to_string(file).map_err(|e| {
        FrameworkError::Configuration(format!(
            "cannot read domain config file '{}': {e}",
            file.display()
        ))
    })?;
    let document = roxmltree::Document::parse(&text).map_err(|e| {
        FrameworkError::Configuration(format!(
            "malformed domain config file '{}': {e}",
            file.display()
        ))
    })?;
    let mut parameters = HashMap::new();
    if let Some(container) = document
        .descendants()
        .find(|n| n.is_element() && n.has_tag_name("Parameters"))
    {
        for node in container.children().filter(|n| n.is_element()) {
            if node.children().any(|c| c.is_element()) {
                continue;
            }
            parameters.insert(
                node.tag_name().name().to_string(),
                node.text().unwrap_or("").to_string(),
            );
        }
    }
    Ok(parameters)
}
