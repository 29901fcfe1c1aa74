use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Client Value Objects
// ============================================================================

/// Postal address as resolved by the postal-code (CEP) lookup service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub neighborhood: String,
    pub city: String,
    /// Two-letter state code (UF)
    pub state: String,
    pub postal_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: Uuid,
    pub name: String,
    pub address: Option<Address>,
    /// House/building number; not part of the postal lookup result
    pub address_number: String,
    pub complement: Option<String>,
}

impl Client {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            address: None,
            address_number: String::new(),
            complement: None,
        }
    }

    pub fn with_address(mut self, address: Address, number: impl Into<String>) -> Self {
        self.address = Some(address);
        self.address_number = number.into();
        self
    }

    pub fn with_complement(mut self, complement: impl Into<String>) -> Self {
        self.complement = Some(complement.into());
        self
    }

    /// Single-line delivery address, or `None` when no address is configured.
    ///
    /// Format: `{street}, {number}, {neighborhood} - {city}/{state}. CEP: {postal_code}. Complemento: {complement}`
    /// with an empty complement when none is set.
    pub fn delivery_address(&self) -> Option<String> {
        let address = self.address.as_ref()?;
        Some(format!(
            "{}, {}, {} - {}/{}. CEP: {}. Complemento: {}",
            address.street,
            self.address_number,
            address.neighborhood,
            address.city,
            address.state,
            address.postal_code,
            self.complement.as_deref().unwrap_or(""),
        ))
    }
}
