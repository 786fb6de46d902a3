use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Lifecycle status as stored in the `Status` column of the `Reservas`
/// sheet. Operators edit the sheet by hand, so values outside the known
/// lifecycle are preserved verbatim rather than rejected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    Pending,
    Cancelled,
    Other(String),
}

impl ReservationStatus {
    pub fn from_sheet_value(value: &str) -> Self {
        let normalized = value.trim();
        if normalized.eq_ignore_ascii_case("pendiente") {
            Self::Pending
        } else if normalized.eq_ignore_ascii_case("cancelada") {
            Self::Cancelled
        } else {
            Self::Other(normalized.to_string())
        }
    }

    pub fn as_sheet_value(&self) -> &str {
        match self {
            Self::Pending => "Pendiente",
            Self::Cancelled => "Cancelada",
            Self::Other(raw) => raw,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub reference: String,
    pub customer_name: String,
    pub phone: String,
    pub email: String,
    pub tax_id: String,
    pub product_name: String,
    pub size: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    /// The only legal transition is Pending -> Cancelled, exactly once.
    pub fn can_transition_to(&self, next: &ReservationStatus) -> bool {
        matches!(
            (&self.status, next),
            (ReservationStatus::Pending, ReservationStatus::Cancelled)
        )
    }

    pub fn transition_to(&mut self, next: ReservationStatus) -> Result<(), DomainError> {
        if self.can_transition_to(&next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidStatusTransition { from: self.status.clone(), to: next })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use crate::errors::DomainError;

    use super::{Reservation, ReservationStatus};

    fn reservation(status: ReservationStatus) -> Reservation {
        Reservation {
            reference: "RES-20260824-A1B2".to_string(),
            customer_name: "Ana Pérez".to_string(),
            phone: "3515917952".to_string(),
            email: "ana@example.com".to_string(),
            tax_id: "No especificado".to_string(),
            product_name: "Bota".to_string(),
            size: "38".to_string(),
            quantity: 2,
            unit_price: Decimal::new(80, 0),
            total_price: Decimal::new(160, 0),
            status,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn pending_can_be_cancelled_once() {
        let mut reservation = reservation(ReservationStatus::Pending);
        reservation.transition_to(ReservationStatus::Cancelled).expect("pending -> cancelled");
        assert_eq!(reservation.status, ReservationStatus::Cancelled);

        let error = reservation
            .transition_to(ReservationStatus::Cancelled)
            .expect_err("cancelled -> cancelled should fail");
        assert!(matches!(error, DomainError::InvalidStatusTransition { .. }));
    }

    #[test]
    fn cancelled_cannot_return_to_pending() {
        let mut reservation = reservation(ReservationStatus::Cancelled);
        assert!(reservation.transition_to(ReservationStatus::Pending).is_err());
    }

    #[test]
    fn sheet_values_parse_case_insensitively_and_keep_unknowns() {
        assert_eq!(ReservationStatus::from_sheet_value("pendiente"), ReservationStatus::Pending);
        assert_eq!(ReservationStatus::from_sheet_value("CANCELADA"), ReservationStatus::Cancelled);
        assert_eq!(
            ReservationStatus::from_sheet_value("Entregada"),
            ReservationStatus::Other("Entregada".to_string())
        );
        assert_eq!(
            ReservationStatus::Other("Entregada".to_string()).as_sheet_value(),
            "Entregada"
        );
    }
}
