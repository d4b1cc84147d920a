//! Vendor activity coercion.
//!
//! A [`VendorActivity`] carries vendor-facing identifiers only and cannot
//! scope core database access. Before any core call it is coerced into the
//! [`CreditUserActivity`] configured for the vendor client, through framework
//! database lookups executed under the impersonated service identity for the
//! company. Coercion is reserved for service callers; a caller that already
//! runs under a web user context is rejected up front.

use crate::activity::{Activity, ActivityType, CreditUserActivity, DatabaseActivity, VendorActivity};
use crate::config::Configuration;
use crate::error::{FrameworkError, Result};
use crate::persistence::{Parameter, ProcedureExecutor, Value};
use crate::security::{ImpersonationScope, Impersonator};

pub const COERCE_VENDOR_TO_USER_ACTIVITY: &str = "fw_coerce_vendor_to_user_activity";
pub const CENTER_NUMBER_FROM_DEALER_ID: &str = "fw_center_number_from_dealer_id";
pub const VENDOR_CLIENT_ATTRIBUTES: &str = "fw_vendor_client_attributes";

/// Session probe used to confirm that a freshly loaded credential actually
/// produced the impersonated principal.
const SESSION_PRINCIPAL: &str = "SELECT SYSTEM_USER";

impl VendorActivity {
    /// Coerce this vendor activity into the credit user activity configured
    /// for the vendor client.
    ///
    /// The company, center and user come from the framework database. When
    /// the dealer ID is set, the center is narrowed to the dealer's credit
    /// center through a second lookup in the company database; an empty
    /// dealer ID keeps the vendor client's default center. The activity ID
    /// and culture carry over to the coerced activity.
    pub fn coerce_to_user_activity(
        &mut self,
        configuration: &Configuration,
        executor: &dyn ProcedureExecutor,
        impersonator: &dyn Impersonator,
    ) -> Result<CreditUserActivity> {
        if impersonator.has_user_context() {
            return Err(FrameworkError::Access(
                "vendor activity coercion cannot be used from a web caller context".to_string(),
            ));
        }
        self.coerce(configuration, executor, impersonator).map_err(|e| {
            FrameworkError::persistence(
                format!(
                    "failed to coerce vendor activity to credit user activity \
                     (Vendor ID:'{}', Vendor Client:'{}', Dealer ID:'{}')",
                    self.vendor_id, self.vendor_client_nbr, self.dealer_id
                ),
                e,
            )
        })
    }

    fn coerce(
        &mut self,
        configuration: &Configuration,
        executor: &dyn ProcedureExecutor,
        impersonator: &dyn Impersonator,
    ) -> Result<CreditUserActivity> {
        let mut params = [
            Parameter::input("vendorId", self.vendor_id.as_str()),
            Parameter::input("vendorClientNbr", self.vendor_client_nbr.as_str()),
            Parameter::input("productCode", self.product_code.as_str()),
        ];
        let context_xml = self
            .impersonated_scalar(
                configuration,
                executor,
                impersonator,
                0,
                "FRAMEWORK",
                COERCE_VENDOR_TO_USER_ACTIVITY,
                &mut params,
            )?
            .ok_or_else(|| {
                FrameworkError::Validation(
                    "vendor coercion returned no vendor client context".to_string(),
                )
            })?
            .as_text();

        let document = roxmltree::Document::parse(&context_xml).map_err(|e| {
            FrameworkError::Validation(format!("malformed vendor client context XML: {e}"))
        })?;
        let root = document.root_element();
        let company_nbr = child_i32(root, "compNbr")?.unwrap_or(0);
        let mut center_nbr = child_i32(root, "centerNbr")?.unwrap_or(0);
        let user_id = child_text(root, "userId").unwrap_or("").to_string();
        if let Some(channel_id) = child_i32(root, "channelid")? {
            self.channel_id = Some(channel_id);
        }
        if company_nbr == 0 || center_nbr == 0 || user_id.is_empty() {
            return Err(FrameworkError::Validation(format!(
                "vendor client context is incomplete \
                 (CompanyNbr:'{company_nbr}', CenterNbr:'{center_nbr}', UserId:'{user_id}')"
            )));
        }

        if !self.dealer_id.is_empty() {
            let mut params = [
                Parameter::input("compNbr", company_nbr),
                Parameter::input("dealerId", self.dealer_id.as_str()),
                Parameter::input("productCode", self.product_code.as_str()),
                Parameter::input("financeSourceId", self.vendor_client_nbr.as_str()),
                Parameter::input("vendorId", self.vendor_id.as_str()),
            ];
            let dealer_center = self.impersonated_scalar(
                configuration,
                executor,
                impersonator,
                company_nbr,
                &format!("Company{company_nbr}"),
                CENTER_NUMBER_FROM_DEALER_ID,
                &mut params,
            )?;
            if let Some(value) = dealer_center
                && value != Value::Null
            {
                let dealer_center_nbr = value.as_i32()?;
                if dealer_center_nbr != 0 {
                    center_nbr = dealer_center_nbr;
                }
            }
        }

        CreditUserActivity::with_context(
            &self.core.domain_name,
            company_nbr,
            center_nbr,
            &user_id,
            ActivityType::Oltp,
            self.core.culture,
            self.core.activity_id(),
        )
    }

    /// Attribute blob configured for the vendor client, fetched once under
    /// the framework service identity and cached on the activity. A NULL
    /// configuration yields an empty string.
    pub fn vendor_client_attributes(
        &mut self,
        configuration: &Configuration,
        executor: &dyn ProcedureExecutor,
        impersonator: &dyn Impersonator,
    ) -> Result<String> {
        if let Some(cached) = &self.vendor_client_attributes {
            return Ok(cached.clone());
        }
        if impersonator.has_user_context() {
            return Err(FrameworkError::Access(
                "vendor client attribute lookup cannot be used from a web caller context"
                    .to_string(),
            ));
        }
        let mut params = [
            Parameter::input("vendorId", self.vendor_id.as_str()),
            Parameter::input("vendorClientNbr", self.vendor_client_nbr.as_str()),
        ];
        let attributes = self
            .impersonated_scalar(
                configuration,
                executor,
                impersonator,
                0,
                "FRAMEWORK",
                VENDOR_CLIENT_ATTRIBUTES,
                &mut params,
            )
            .map_err(|e| {
                FrameworkError::persistence(
                    format!(
                        "failed to get the vendor client attributes({};{})",
                        self.vendor_id, self.vendor_client_nbr
                    ),
                    e,
                )
            })?
            .map(|value| value.as_text())
            .unwrap_or_default();
        self.vendor_client_attributes = Some(attributes.clone());
        Ok(attributes)
    }

    /// Run a scalar procedure against the named database, impersonating the
    /// company's configured service identity when one exists. A freshly
    /// loaded credential is validated against the live session principal; a
    /// cache hit is trusted.
    fn impersonated_scalar(
        &self,
        configuration: &Configuration,
        executor: &dyn ProcedureExecutor,
        impersonator: &dyn Impersonator,
        company_nbr: i32,
        database_name: &str,
        procedure: &str,
        params: &mut [Parameter],
    ) -> Result<Option<Value>> {
        let scope = Activity::Database(DatabaseActivity::new(
            &self.core.domain_name,
            database_name,
        )?);
        match configuration.get_credentials(company_nbr)? {
            Some(credentials) => {
                let _guard = ImpersonationScope::acquire(impersonator, &credentials)?;
                if !credentials.from_cache {
                    let principal = executor
                        .execute_statement_scalar(&scope, SESSION_PRINCIPAL)?
                        .map(|value| value.as_text())
                        .unwrap_or_default();
                    let expected =
                        format!("{}\\{}", credentials.domain, credentials.user_id);
                    if !principal.eq_ignore_ascii_case(&expected) {
                        return Err(FrameworkError::Configuration(format!(
                            "impersonation of '{expected}' did not produce a trusted \
                             connection; the database session reports '{principal}'"
                        )));
                    }
                }
                executor.execute_scalar(&scope, procedure, params)
            }
            None => executor.execute_scalar(&scope, procedure, params),
        }
    }
}

fn child_text<'a>(element: roxmltree::Node<'a, '_>, tag: &str) -> Option<&'a str> {
    element
        .descendants()
        .find(|n| n.is_element() && n.has_tag_name(tag))
        .map(|n| n.text().unwrap_or(""))
}

fn child_i32(element: roxmltree::Node<'_, '_>, tag: &str) -> Result<Option<i32>> {
    match child_text(element, tag) {
        None => Ok(None),
        Some(text) => text.trim().parse().map(Some).map_err(|_| {
            FrameworkError::Validation(format!(
                "cannot convert {tag} value '{text}' to an integer"
            ))
        }),
    }
}
