//! Invoice numbering: `INV-<org4>-<sequence5>`.
//!
//! The sequence itself is allocated by the store (atomic per-organization
//! counter); this module only owns the format.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use careledger_core::{DomainError, OrganizationId};

const PREFIX: &str = "INV";
const ORG_PREFIX_LEN: usize = 4;
const SEQUENCE_WIDTH: usize = 5;

/// Invoice number, unique per organization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceNumber(String);

impl InvoiceNumber {
    /// Format the number for the `sequence`-th invoice of an organization.
    ///
    /// `sequence` is 1-based. Sequences beyond 99999 keep growing in width.
    pub fn format(organization_id: OrganizationId, sequence: u64) -> Self {
        let org = organization_id.to_string();
        let org4: String = org.chars().take(ORG_PREFIX_LEN).collect();
        Self(format!("{PREFIX}-{org4}-{sequence:0width$}", width = SEQUENCE_WIDTH))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

}

impl core::fmt::Display for InvoiceNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for InvoiceNumber {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '-');
        let (Some(prefix), Some(org), Some(seq)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(DomainError::invalid_id(format!("InvoiceNumber: malformed '{s}'")));
        };
        if prefix != PREFIX || org.chars().count() != ORG_PREFIX_LEN {
            return Err(DomainError::invalid_id(format!("InvoiceNumber: malformed '{s}'")));
        }
        if seq.len() < SEQUENCE_WIDTH || !seq.chars().all(|c| c.is_ascii_digit()) {
            return Err(DomainError::invalid_id(format!(
                "InvoiceNumber: bad sequence in '{s}'"
            )));
        }
        Ok(Self(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn org() -> OrganizationId {
        OrganizationId::from_uuid(Uuid::parse_str("3f2a9c1e-0000-7000-8000-000000000000").unwrap())
    }

    #[test]
    fn formats_org_prefix_and_padded_sequence() {
        let n = InvoiceNumber::format(org(), 42);
        assert_eq!(n.as_str(), "INV-3f2a-00042");
    }

    #[test]
    fn first_invoice_is_sequence_one() {
        assert_eq!(InvoiceNumber::format(org(), 1).as_str(), "INV-3f2a-00001");
    }

    #[test]
    fn wide_sequences_are_not_truncated() {
        assert_eq!(InvoiceNumber::format(org(), 123_456).as_str(), "INV-3f2a-123456");
    }

    #[test]
    fn parse_validates_shape() {
        assert!("INV-3f2a-00042".parse::<InvoiceNumber>().is_ok());
        assert!("INV-3f2a-42".parse::<InvoiceNumber>().is_err());
        assert!("BILL-3f2a-00042".parse::<InvoiceNumber>().is_err());
        assert!("INV-3f2a".parse::<InvoiceNumber>().is_err());
    }
}
