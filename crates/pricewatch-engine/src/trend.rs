//! Short-term price change between the latest stored price and a new one.

use pricewatch_core::AppConfig;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

/// Label attached to notable moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendTag {
    Surge,
    Rise,
    Drop,
    Plunge,
}

/// Change from `old` to `new`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceChange {
    pub old: Decimal,
    pub new: Decimal,
    /// `(new - old) / old`, rounded half-up to 4 places.
    pub ratio: Decimal,
    /// `ratio` as a percentage with 2 places.
    pub percent: Decimal,
}

impl PriceChange {
    /// `None` when `old` is not positive.
    #[must_use]
    pub fn between(old: Decimal, new: Decimal) -> Option<Self> {
        if old <= Decimal::ZERO {
            return None;
        }
        let ratio =
            ((new - old) / old).round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero);
        let percent = (ratio * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        Some(Self {
            old,
            new,
            ratio,
            percent,
        })
    }

    /// Signed percentage text: `"+6.00%"`, `"-12.50%"`, `"0.00%"`.
    #[must_use]
    pub fn text(&self) -> String {
        if self.percent > Decimal::ZERO {
            format!("+{:.2}%", self.percent)
        } else if self.percent < Decimal::ZERO {
            format!("{:.2}%", self.percent)
        } else {
            "0.00%".to_string()
        }
    }

    #[must_use]
    pub fn tag(&self) -> Option<TrendTag> {
        let ten = Decimal::TEN;
        let five = Decimal::from(5);
        if self.percent > ten {
            Some(TrendTag::Surge)
        } else if self.percent > five {
            Some(TrendTag::Rise)
        } else if self.percent < -ten {
            Some(TrendTag::Plunge)
        } else if self.percent < -five {
            Some(TrendTag::Drop)
        } else {
            None
        }
    }
}

/// When a change is worth a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertPolicy {
    /// Fractional change that must be exceeded, e.g. `0.05`.
    pub change_threshold: Decimal,
    /// New prices at or below this floor never alert.
    pub min_price: Decimal,
}

impl AlertPolicy {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            change_threshold: config.alert_change_threshold,
            min_price: config.alert_min_price,
        }
    }

    #[must_use]
    pub fn should_alert(&self, change: &PriceChange) -> bool {
        change.new > self.min_price && change.ratio.abs() > self.change_threshold
    }
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            change_threshold: Decimal::new(5, 2),
            min_price: Decimal::from(50),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn change(old: &str, new: &str) -> PriceChange {
        PriceChange::between(dec(old), dec(new)).unwrap()
    }

    #[test]
    fn six_percent_rise() {
        let c = change("100.00", "106.00");
        assert_eq!(c.ratio, dec("0.06"));
        assert_eq!(c.text(), "+6.00%");
        assert_eq!(c.tag(), Some(TrendTag::Rise));
        assert!(AlertPolicy::default().should_alert(&c));
    }

    #[test]
    fn negative_and_flat_text() {
        assert_eq!(change("80", "70").text(), "-12.50%");
        assert_eq!(change("80", "70").tag(), Some(TrendTag::Plunge));
        assert_eq!(change("80", "80").text(), "0.00%");
        assert_eq!(change("80", "80").tag(), None);
    }

    #[test]
    fn ratio_rounds_half_up_to_four_places() {
        // 1/3 = 0.33333.. -> 0.3333 -> 33.33%
        assert_eq!(change("3", "4").percent, dec("33.33"));
        // 0.00005 rounds away from zero
        assert_eq!(change("100000", "100005").ratio, dec("0.0001"));
    }

    #[test]
    fn non_positive_old_price_has_no_change() {
        assert!(PriceChange::between(Decimal::ZERO, dec("10")).is_none());
    }

    #[test]
    fn cheap_items_and_small_moves_do_not_alert() {
        let policy = AlertPolicy::default();
        assert!(!policy.should_alert(&change("40", "48")));
        assert!(!policy.should_alert(&change("100", "104")));
        assert!(!policy.should_alert(&change("100", "105")));
        assert!(policy.should_alert(&change("100", "94")));
    }

    #[test]
    fn tags_follow_percentage_bands() {
        assert_eq!(change("100", "111").tag(), Some(TrendTag::Surge));
        assert_eq!(change("100", "94").tag(), Some(TrendTag::Drop));
        assert_eq!(change("100", "105").tag(), None);
    }
}
