//! CSR subject construction.

use arca_core::Identity;

/// Distinguished name fields placed in the CSR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectFields {
    pub country: String,
    pub organization: String,
    pub common_name: String,
    pub serial_number: String,
}

impl SubjectFields {
    /// Fields the portal expects for a taxpayer's computer certificate.
    pub fn for_taxpayer(identity: &Identity, tax_id: &str) -> Self {
        Self {
            country: "AR".to_string(),
            organization: format!("Agencia {} SAS", identity.sanitized_name()),
            common_name: "Sistema de Gestion".to_string(),
            serial_number: format!("CUIT {}", tax_id),
        }
    }

    /// Render as the value of `openssl req -subj`.
    ///
    /// Values are escaped so separators inside a display name cannot add
    /// or reorder attributes.
    pub fn to_openssl_subject(&self) -> String {
        format!(
            "/C={}/O={}/CN={}/serialNumber={}",
            escape(&self.country),
            escape(&self.organization),
            escape(&self.common_name),
            escape(&self.serial_number)
        )
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' | '/' | '+' | '=' => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}
