use lcrm_core::OrderStatus;
use serde::{Deserialize, Serialize};

/// One phrase of the external status vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRule {
    pub phrase: String,
    pub status: OrderStatus,
}

/// Maps free-text dashboard statuses onto [`OrderStatus`].
///
/// Lookup is an exact match on the lower-cased text first, then substring
/// containment against each phrase in table order; the first phrase found
/// wins. Empty or unknown text maps to `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMapper {
    rules: Vec<(String, OrderStatus)>,
}

impl Default for StatusMapper {
    fn default() -> Self {
        Self::from_pairs([
            ("отрисовка", OrderStatus::Drafting),
            ("ждем прибытия материала", OrderStatus::AwaitingMaterial),
            ("ждём прибытия материала", OrderStatus::AwaitingMaterial),
            ("ждет отгрузку материала", OrderStatus::AwaitingMaterial),
            ("приехал в цех", OrderStatus::ArrivedAtShop),
            ("на распиле", OrderStatus::BeingCut),
            ("заказ готов", OrderStatus::Ready),
            ("готов", OrderStatus::Ready),
        ])
    }
}

impl StatusMapper {
    pub fn from_pairs<S: AsRef<str>>(pairs: impl IntoIterator<Item = (S, OrderStatus)>) -> Self {
        let rules = pairs
            .into_iter()
            .map(|(phrase, status)| (normalize(phrase.as_ref()), status))
            .filter(|(phrase, _)| !phrase.is_empty())
            .collect();
        Self { rules }
    }

    pub fn from_rules(rules: Vec<StatusRule>) -> Self {
        Self::from_pairs(rules.into_iter().map(|r| (r.phrase, r.status)))
    }

    pub fn rules(&self) -> impl Iterator<Item = (&str, OrderStatus)> {
        self.rules.iter().map(|(phrase, status)| (phrase.as_str(), *status))
    }

    pub fn map(&self, external: &str) -> Option<OrderStatus> {
        let text = normalize(external);
        if text.is_empty() {
            return None;
        }
        if let Some((_, status)) = self.rules.iter().find(|(phrase, _)| *phrase == text) {
            return Some(*status);
        }
        self.rules
            .iter()
            .find(|(phrase, _)| text.contains(phrase.as_str()))
            .map(|(_, status)| *status)
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_phrase_maps_exactly() {
        let mapper = StatusMapper::default();
        for (phrase, status) in mapper.rules() {
            assert_eq!(mapper.map(phrase), Some(status), "{phrase}");
        }
    }

    #[test]
    fn matching_is_case_insensitive_and_falls_back_to_substring() {
        let mapper = StatusMapper::default();
        assert_eq!(mapper.map("  ЗАКАЗ ГОТОВ "), Some(OrderStatus::Ready));
        assert_eq!(mapper.map("Статус: на распиле (2 листа)"), Some(OrderStatus::BeingCut));
        assert_eq!(mapper.map("Ждём прибытия материала"), Some(OrderStatus::AwaitingMaterial));
        assert_eq!(mapper.map(""), None);
        assert_eq!(mapper.map("отменён"), None);
    }

    #[test]
    fn first_listed_phrase_wins_on_overlap() {
        let mapper = StatusMapper::from_pairs([
            ("готов", OrderStatus::BeingCut),
            ("заказ готов", OrderStatus::Ready),
        ]);
        // exact match beats table order
        assert_eq!(mapper.map("заказ готов"), Some(OrderStatus::Ready));
        assert_eq!(mapper.map("заказ готов к выдаче"), Some(OrderStatus::BeingCut));
    }
}
