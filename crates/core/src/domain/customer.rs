use serde::{Deserialize, Serialize};

/// Determines which price column of the catalog applies to a customer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerTier {
    #[default]
    Retail,
    ResaleA,
    ResaleB,
}

impl CustomerTier {
    /// Maps the raw `Tipo Cliente` value onto a tier. Anything that is not a
    /// recognized resale label prices as retail, including blanks.
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim();
        if normalized.eq_ignore_ascii_case("reventa a") {
            Self::ResaleA
        } else if normalized.eq_ignore_ascii_case("reventa b") {
            Self::ResaleB
        } else {
            Self::Retail
        }
    }
}

/// One row of the `Clientes` sheet. `tier_label` keeps the raw sheet value
/// because the profile note quotes it back to the assistant verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub phone: String,
    pub first_name: String,
    pub last_name: String,
    pub nickname: String,
    pub tier: CustomerTier,
    pub tier_label: String,
    pub email: String,
    pub tax_id: String,
}

impl CustomerProfile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[cfg(test)]
mod tests {
    use super::CustomerTier;

    #[test]
    fn resale_labels_map_to_their_tiers() {
        assert_eq!(CustomerTier::from_label("Reventa A"), CustomerTier::ResaleA);
        assert_eq!(CustomerTier::from_label("reventa b"), CustomerTier::ResaleB);
        assert_eq!(CustomerTier::from_label(" Reventa A "), CustomerTier::ResaleA);
    }

    #[test]
    fn unknown_or_blank_labels_price_as_retail() {
        assert_eq!(CustomerTier::from_label("Cliente Final"), CustomerTier::Retail);
        assert_eq!(CustomerTier::from_label(""), CustomerTier::Retail);
    }
}
