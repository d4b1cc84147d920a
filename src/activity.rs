//! Activity context model.
//!
//! An activity is the identity/locale context attached to a business
//! operation and flows with all data. Three variants exist:
//! [`CreditUserActivity`] for credit database users coming from the web tier,
//! [`DatabaseActivity`] for activity against a named database, and
//! [`VendorActivity`] for flows initiated by a vendor interface.
//!
//! Construction is the validation gate: no activity instance can exist in a
//! state that violates its variant's required-field rule, whether it was
//! built programmatically or parsed from activity XML.

use std::fmt;
use std::str::FromStr;

use crate::error::{FrameworkError, Result};

/// Qualifies the type of activity. The default is OLTP data flow; archive and
/// document activity can be specified explicitly in the activity context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivityType {
    #[default]
    Oltp,
    Archive,
    Document,
}

impl FromStr for ActivityType {
    type Err = FrameworkError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "oltp" => Ok(ActivityType::Oltp),
            "archive" => Ok(ActivityType::Archive),
            "document" => Ok(ActivityType::Document),
            other => Err(FrameworkError::Validation(format!(
                "unrecognized activity type '{other}'"
            ))),
        }
    }
}

/// Culture/language of the user behind the activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Culture {
    #[default]
    EnUs,
    EsEs,
    FrFr,
}

impl Culture {
    pub fn as_str(&self) -> &'static str {
        match self {
            Culture::EnUs => "en-US",
            Culture::EsEs => "es-ES",
            Culture::FrFr => "fr-FR",
        }
    }
}

impl fmt::Display for Culture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields shared by every activity variant.
#[derive(Debug, Clone)]
pub struct ActivityCore {
    activity_id: String,
    pub domain_name: String,
    pub system_nbr: i32,
    pub user_id: String,
    pub activity_type: ActivityType,
    pub culture: Culture,
}

impl Default for ActivityCore {
    fn default() -> Self {
        ActivityCore {
            activity_id: uuid7::uuid7().to_string(),
            domain_name: String::new(),
            system_nbr: 0,
            user_id: String::new(),
            activity_type: ActivityType::Oltp,
            culture: Culture::EnUs,
        }
    }
}

impl ActivityCore {
    /// Activity ID is a UUID that can be set by the consumer originating the
    /// data flow. If not, a fresh one is generated at construction.
    pub fn activity_id(&self) -> &str {
        &self.activity_id
    }

    /// Replace the activity ID. The value must be a well-formed UUID.
    pub fn set_activity_id(&mut self, value: &str) -> Result<()> {
        if value.parse::<uuid7::Uuid>().is_err() {
            return Err(FrameworkError::Validation(format!(
                "cannot create an activity id from '{value}': not a well-formed UUID"
            )));
        }
        self.activity_id = value.to_string();
        Ok(())
    }

    /// Assign the culture from its wire form.
    ///
    /// An empty value or "en-US" (any case) selects English, "es-ES" Spanish,
    /// "fr-FR" French. Any other value leaves the current culture unchanged.
    /// The silent ignore is long-standing production behavior and is kept
    /// until product confirms otherwise; see the regression test.
    pub fn assign_culture(&mut self, value: &str) {
        if value.is_empty() || value.eq_ignore_ascii_case("en-US") {
            self.culture = Culture::EnUs;
        } else if value.eq_ignore_ascii_case("es-ES") {
            self.culture = Culture::EsEs;
        } else if value.eq_ignore_ascii_case("fr-FR") {
            self.culture = Culture::FrFr;
        }
    }
}

/// Activity against a specific named database (TRM, CENTRAL, MESSAGE, ...).
#[derive(Debug, Clone)]
pub struct DatabaseActivity {
    pub core: ActivityCore,
    pub database_name: String,
}

impl DatabaseActivity {
    pub fn new(domain_name: &str, database_name: &str) -> Result<Self> {
        let mut core = ActivityCore::default();
        core.domain_name = domain_name.to_string();
        let activity = DatabaseActivity {
            core,
            database_name: database_name.to_string(),
        };
        activity.validate()?;
        Ok(activity)
    }

    pub fn with_user(domain_name: &str, database_name: &str, user_id: &str) -> Result<Self> {
        let mut activity = Self::new(domain_name, database_name)?;
        activity.core.user_id = user_id.to_string();
        Ok(activity)
    }

    fn validate(&self) -> Result<()> {
        if self.core.domain_name.is_empty() || self.database_name.is_empty() {
            return Err(FrameworkError::Validation(format!(
                "invalid DatabaseActivity({}, {})",
                self.core.domain_name, self.database_name
            )));
        }
        Ok(())
    }

    fn from_element(element: roxmltree::Node<'_, '_>) -> Result<Self> {
        let domain = element_text(element, "DomainName");
        let database = element_text(element, "DatabaseName");
        let (Some(domain), Some(database)) = (domain, database) else {
            return Err(FrameworkError::Validation(format!(
                "invalid DatabaseActivity({}, {}): activity element not initialized",
                domain.unwrap_or(""),
                database.unwrap_or("")
            )));
        };
        let mut core = ActivityCore::default();
        core.domain_name = domain.to_string();
        let mut activity = DatabaseActivity {
            core,
            database_name: database.to_string(),
        };
        apply_optional_elements(&mut activity.core, element)?;
        activity.validate()?;
        Ok(activity)
    }
}

/// Credit database user activity, the canonical identity used by core
/// database access.
#[derive(Debug, Clone)]
pub struct CreditUserActivity {
    pub core: ActivityCore,
    pub company_nbr: i32,
    pub center_nbr: i32,
}

impl CreditUserActivity {
    pub fn new(domain_name: &str, company_nbr: i32, user_id: &str) -> Result<Self> {
        Self::with_center(domain_name, company_nbr, 0, user_id)
    }

    pub fn with_center(
        domain_name: &str,
        company_nbr: i32,
        center_nbr: i32,
        user_id: &str,
    ) -> Result<Self> {
        let mut core = ActivityCore::default();
        core.domain_name = domain_name.to_string();
        core.user_id = user_id.to_string();
        let activity = CreditUserActivity {
            core,
            company_nbr,
            center_nbr,
        };
        activity.validate()?;
        Ok(activity)
    }

    /// Fully specified constructor, used when one context is rebuilt from
    /// another (vendor coercion, response contexts).
    pub fn with_context(
        domain_name: &str,
        company_nbr: i32,
        center_nbr: i32,
        user_id: &str,
        activity_type: ActivityType,
        culture: Culture,
        activity_id: &str,
    ) -> Result<Self> {
        let mut activity = Self::with_center(domain_name, company_nbr, center_nbr, user_id)?;
        activity.core.activity_type = activity_type;
        activity.core.culture = culture;
        activity.core.set_activity_id(activity_id)?;
        Ok(activity)
    }

    fn validate(&self) -> Result<()> {
        if self.core.domain_name.is_empty() || self.company_nbr < 1 {
            return Err(FrameworkError::Validation(format!(
                "invalid CreditUserActivity({}, {}, {})",
                self.core.domain_name, self.company_nbr, self.core.user_id
            )));
        }
        Ok(())
    }

    fn from_element(element: roxmltree::Node<'_, '_>) -> Result<Self> {
        let domain = element_text(element, "DomainName");
        let company = element_text(element, "CompanyNbr");
        let (Some(domain), Some(company)) = (domain, company) else {
            return Err(FrameworkError::Validation(format!(
                "invalid CreditUserActivity({}, {}, {}): activity element not initialized",
                domain.unwrap_or(""),
                company.unwrap_or(""),
                element_text(element, "UserId").unwrap_or("")
            )));
        };
        let mut core = ActivityCore::default();
        core.domain_name = domain.to_string();
        let mut activity = CreditUserActivity {
            core,
            company_nbr: parse_i32("CompanyNbr", company)?,
            center_nbr: 0,
        };
        if let Some(center) = element_text(element, "CenterNbr") {
            activity.center_nbr = parse_i32("CenterNbr", center)?;
        }
        apply_optional_elements(&mut activity.core, element)?;
        activity.validate()?;
        Ok(activity)
    }
}

/// Vendor database activity initiated by a vendor interface.
///
/// A vendor activity cannot reach core data directly; it is coerced into a
/// [`CreditUserActivity`] first (see the `vendor` module). If the dealer ID is
/// left empty the coercion yields the default credit center for the vendor
/// client and finance source, so inbound credit applications must always
/// carry a dealer ID.
#[derive(Debug, Clone)]
pub struct VendorActivity {
    pub core: ActivityCore,
    pub vendor_id: String,
    pub vendor_client_nbr: String,
    pub dealer_id: String,
    pub product_code: String,
    pub channel_id: Option<i32>,
    pub(crate) vendor_client_attributes: Option<String>,
}

impl VendorActivity {
    pub fn new(
        domain_name: &str,
        vendor_id: &str,
        vendor_client_nbr: &str,
        dealer_id: &str,
    ) -> Result<Self> {
        let mut core = ActivityCore::default();
        core.domain_name = domain_name.to_string();
        let activity = VendorActivity {
            core,
            vendor_id: vendor_id.to_string(),
            vendor_client_nbr: vendor_client_nbr.to_string(),
            dealer_id: dealer_id.to_string(),
            product_code: String::new(),
            channel_id: None,
            vendor_client_attributes: None,
        };
        activity.validate()?;
        Ok(activity)
    }

    pub fn with_product_code(
        domain_name: &str,
        vendor_id: &str,
        vendor_client_nbr: &str,
        product_code: &str,
        dealer_id: &str,
    ) -> Result<Self> {
        let mut activity = Self::new(domain_name, vendor_id, vendor_client_nbr, dealer_id)?;
        activity.product_code = product_code.to_string();
        Ok(activity)
    }

    /// Pre-seed the vendor client attributes cache (used by callers that
    /// already resolved them).
    pub fn set_vendor_client_attributes(&mut self, value: impl Into<String>) {
        self.vendor_client_attributes = Some(value.into());
    }

    fn validate(&self) -> Result<()> {
        if self.core.domain_name.is_empty()
            || self.vendor_id.is_empty()
            || self.vendor_client_nbr.is_empty()
        {
            return Err(FrameworkError::Validation(format!(
                "invalid VendorActivity: required parameter is an empty string \
                 (Domain:'{}', Vendor ID:'{}', Vendor Client:'{}')",
                self.core.domain_name, self.vendor_id, self.vendor_client_nbr
            )));
        }
        Ok(())
    }

    fn from_element(element: roxmltree::Node<'_, '_>) -> Result<Self> {
        let domain = element_text(element, "DomainName");
        let vendor_id = element_text(element, "VendorId");
        let vendor_client = element_text(element, "VendorClientNbr");
        if domain.is_none() || vendor_id.is_none() || vendor_client.is_none() {
            return Err(FrameworkError::Validation(format!(
                "invalid VendorActivity: activity element not initialized \
                 (Domain:'{}', Vendor ID:'{}', Vendor Client:'{}', Dealer ID:'{}')",
                domain.unwrap_or(""),
                vendor_id.unwrap_or(""),
                vendor_client.unwrap_or(""),
                element_text(element, "DealerId").unwrap_or("")
            )));
        }
        let mut core = ActivityCore::default();
        core.domain_name = domain.unwrap_or_default().to_string();
        let mut activity = VendorActivity {
            core,
            vendor_id: vendor_id.unwrap_or_default().to_string(),
            vendor_client_nbr: vendor_client.unwrap_or_default().to_string(),
            dealer_id: element_text(element, "DealerId").unwrap_or("").to_string(),
            product_code: element_text(element, "ProductCode").unwrap_or("").to_string(),
            channel_id: None,
            vendor_client_attributes: None,
        };
        apply_optional_elements(&mut activity.core, element)?;
        activity.validate()?;
        Ok(activity)
    }
}

/// Tagged union over the concrete activity variants. This is what flows
/// through collaborator interfaces that only care about the shared context.
#[derive(Debug, Clone)]
pub enum Activity {
    Database(DatabaseActivity),
    CreditUser(CreditUserActivity),
    Vendor(VendorActivity),
}

impl Activity {
    pub fn core(&self) -> &ActivityCore {
        match self {
            Activity::Database(a) => &a.core,
            Activity::CreditUser(a) => &a.core,
            Activity::Vendor(a) => &a.core,
        }
    }

    pub fn core_mut(&mut self) -> &mut ActivityCore {
        match self {
            Activity::Database(a) => &mut a.core,
            Activity::CreditUser(a) => &mut a.core,
            Activity::Vendor(a) => &mut a.core,
        }
    }

    /// Create an activity from serialized activity XML, determining the
    /// concrete variant from distinguishing child elements. Useful when
    /// deserializing activity XML of an unknown concrete type.
    pub fn from_xml(xml: &str) -> Result<Activity> {
        let document = roxmltree::Document::parse(xml)
            .map_err(|e| FrameworkError::Validation(format!("malformed activity XML: {e}")))?;
        let element = document.root_element();
        if element_text(element, "DatabaseName").is_some() {
            DatabaseActivity::from_element(element).map(Activity::Database)
        } else if element_text(element, "CompanyNbr").is_some() {
            CreditUserActivity::from_element(element).map(Activity::CreditUser)
        } else if element_text(element, "VendorId").is_some() {
            VendorActivity::from_element(element).map(Activity::Vendor)
        } else {
            Err(FrameworkError::Validation(format!(
                "unrecognized activity XML: {xml}"
            )))
        }
    }
}

/// Text of the first descendant element with the given tag name. An element
/// that is present but empty yields `Some("")`, which is how the constructors
/// tell "missing" apart from "blank".
fn element_text<'a>(element: roxmltree::Node<'a, '_>, tag: &str) -> Option<&'a str> {
    element
        .descendants()
        .find(|n| n.is_element() && n.has_tag_name(tag))
        .map(|n| n.text().unwrap_or(""))
}

fn parse_i32(tag: &str, value: &str) -> Result<i32> {
    value.trim().parse().map_err(|_| {
        FrameworkError::Validation(format!(
            "cannot convert {tag} value '{value}' to an integer"
        ))
    })
}

/// Optional child elements shared by every variant. Absent elements leave
/// the defaults in place.
fn apply_optional_elements(core: &mut ActivityCore, element: roxmltree::Node<'_, '_>) -> Result<()> {
    if let Some(system) = element_text(element, "SystemNbr") {
        core.system_nbr = parse_i32("SystemNbr", system)?;
    }
    if let Some(activity_type) = element_text(element, "ActivityType") {
        core.activity_type = activity_type.parse()?;
    }
    if let Some(user) = element_text(element, "UserId") {
        core.user_id = user.to_string();
    }
    if let Some(culture) = element_text(element, "Culture") {
        core.assign_culture(culture);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_id_defaults_to_generated_uuid() {
        let core = ActivityCore::default();
        assert!(core.activity_id().parse::<uuid7::Uuid>().is_ok());
    }

    #[test]
    fn activity_id_rejects_malformed_uuid() {
        let mut core = ActivityCore::default();
        let before = core.activity_id().to_string();
        assert!(core.set_activity_id("not-a-uuid").is_err());
        assert_eq!(core.activity_id(), before);
    }

    #[test]
    fn activity_type_parses_case_insensitively() {
        assert_eq!("ARCHIVE".parse::<ActivityType>().unwrap(), ActivityType::Archive);
        assert_eq!("document".parse::<ActivityType>().unwrap(), ActivityType::Document);
        assert!("batch".parse::<ActivityType>().is_err());
    }

    /// Regression test for the documented quirk: an unrecognized culture
    /// value leaves the prior culture in place rather than defaulting or
    /// failing.
    #[test]
    fn unknown_culture_leaves_prior_value() {
        let mut core = ActivityCore::default();
        core.assign_culture("es-ES");
        assert_eq!(core.culture, Culture::EsEs);
        core.assign_culture("de-DE");
        assert_eq!(core.culture, Culture::EsEs);
        core.assign_culture("");
        assert_eq!(core.culture, Culture::EnUs);
    }

    #[test]
    fn credit_user_requires_positive_company() {
        assert!(CreditUserActivity::new("CREDIT", 0, "jdoe").is_err());
        assert!(CreditUserActivity::new("", 5, "jdoe").is_err());
        assert!(CreditUserActivity::new("CREDIT", 5, "").is_ok());
    }

    #[test]
    fn database_activity_requires_names() {
        assert!(DatabaseActivity::new("CREDIT", "").is_err());
        assert!(DatabaseActivity::new("", "MESSAGE").is_err());
        assert!(DatabaseActivity::new("CREDIT", "MESSAGE").is_ok());
    }
}
