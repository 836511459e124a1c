use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

/// Closed set of order lifecycle states.
///
/// Automatic transitions (reconciliation) are compare-and-set so that
/// at-least-once webhook delivery cannot double-process a transition.
/// Admin overrides bypass the table but are always audited.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Shipped,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// Whether any transition out of this state is defined.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Shipped | Self::Cancelled | Self::Refunded)
    }

    /// Validates a transition against the state machine:
    /// pending -> paid | cancelled, paid -> shipped | refunded.
    pub fn can_transition_to(self, to: OrderStatus) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Paid)
                | (Self::Pending, Self::Cancelled)
                | (Self::Paid, Self::Shipped)
                | (Self::Paid, Self::Refunded)
        )
    }

    /// Parses the persisted representation, surfacing unknown values.
    pub fn parse(raw: &str) -> Result<Self, crate::errors::ServiceError> {
        raw.parse::<Self>().map_err(|_| {
            crate::errors::ServiceError::InternalError(format!("Unknown order status: {raw}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(OrderStatus::Pending, OrderStatus::Paid, true)]
    #[case(OrderStatus::Pending, OrderStatus::Cancelled, true)]
    #[case(OrderStatus::Paid, OrderStatus::Shipped, true)]
    #[case(OrderStatus::Paid, OrderStatus::Refunded, true)]
    #[case(OrderStatus::Pending, OrderStatus::Refunded, false)]
    #[case(OrderStatus::Pending, OrderStatus::Shipped, false)]
    #[case(OrderStatus::Shipped, OrderStatus::Refunded, false)]
    #[case(OrderStatus::Cancelled, OrderStatus::Paid, false)]
    #[case(OrderStatus::Refunded, OrderStatus::Paid, false)]
    #[case(OrderStatus::Paid, OrderStatus::Pending, false)]
    fn transition_table(
        #[case] from: OrderStatus,
        #[case] to: OrderStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for terminal in [
            OrderStatus::Shipped,
            OrderStatus::Cancelled,
            OrderStatus::Refunded,
        ] {
            assert!(terminal.is_terminal());
            for to in [
                OrderStatus::Pending,
                OrderStatus::Paid,
                OrderStatus::Shipped,
                OrderStatus::Cancelled,
                OrderStatus::Refunded,
            ] {
                assert!(!terminal.can_transition_to(to));
            }
        }
    }

    #[test]
    fn round_trips_through_persisted_form() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Paid,
            OrderStatus::Shipped,
            OrderStatus::Cancelled,
            OrderStatus::Refunded,
        ] {
            let raw = status.to_string();
            assert_eq!(OrderStatus::parse(&raw).unwrap(), status);
        }
        assert!(OrderStatus::parse("delivered").is_err());
    }
}
