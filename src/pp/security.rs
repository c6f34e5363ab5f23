//! Security master data.

use serde::{Deserialize, Serialize};

/// A security (stock, ETF, fund, etc.)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Security {
    pub uuid: String,
    pub name: String,
    /// Currency the security is quoted in
    pub currency: String,
    /// ISIN (International Securities Identification Number)
    pub isin: Option<String>,
    /// WKN (German security identification)
    pub wkn: Option<String>,
}

impl Security {
    pub fn new(name: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            uuid: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            currency: currency.into(),
            isin: None,
            wkn: None,
        }
    }

    pub fn with_isin(mut self, isin: impl Into<String>) -> Self {
        self.isin = Some(isin.into());
        self
    }

    pub fn with_wkn(mut self, wkn: impl Into<String>) -> Self {
        self.wkn = Some(wkn.into());
        self
    }

    /// Primary identifier: the ISIN if known, otherwise the WKN
    pub fn identifier(&self) -> Option<&str> {
        self.isin.as_deref().or(self.wkn.as_deref())
    }

    /// Does this security carry the given ISIN or WKN?
    pub fn has_identifier(&self, id: &str) -> bool {
        self.isin.as_deref() == Some(id) || self.wkn.as_deref() == Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_identifier() {
        let sec = Security::new("Xetra Gold", "EUR").with_wkn("A0S9GB");
        assert_eq!(sec.identifier(), Some("A0S9GB"));

        let sec = sec.with_isin("DE000A0S9GB0");
        assert_eq!(sec.identifier(), Some("DE000A0S9GB0"));
        assert!(sec.has_identifier("A0S9GB"));
        assert!(sec.has_identifier("DE000A0S9GB0"));
        assert!(!sec.has_identifier("US0970231058"));
    }
}
