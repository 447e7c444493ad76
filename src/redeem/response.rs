//! Parsing of the storefront's key registration response.

use serde::Deserialize;
use tracing::debug;

use super::taxonomy::{ErrorTaxonomyEntry, classify, normalize_error_code};

/// Raw JSON body returned by the key registration endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct RegisterKeyResponse {
    success: i64,
    #[serde(default)]
    purchase_result_details: Option<i64>,
    #[serde(default)]
    purchase_receipt_info: Option<PurchaseReceiptInfo>,
}

#[derive(Debug, Deserialize)]
struct PurchaseReceiptInfo {
    #[serde(default)]
    result_detail: Option<i64>,
    #[serde(default)]
    line_items: Vec<LineItem>,
}

#[derive(Debug, Deserialize)]
struct LineItem {
    #[serde(default)]
    line_item_description: String,
}

impl RegisterKeyResponse {
    /// Converts the wire shape into a redemption outcome.
    ///
    /// On failure the code comes from `purchase_result_details`, then
    /// `purchase_receipt_info.result_detail`, then defaults to the throttling
    /// code.
    pub(crate) fn into_result(self) -> RedemptionResult {
        if self.success == 1 {
            let items_granted = self
                .purchase_receipt_info
                .map(|receipt| {
                    receipt
                        .line_items
                        .into_iter()
                        .enumerate()
                        .filter_map(|(position, item)| {
                            if item.line_item_description.is_empty() {
                                debug!(position, "dropping receipt line item without a description");
                                None
                            } else {
                                Some(item.line_item_description)
                            }
                        })
                        .collect()
                })
                .unwrap_or_default();
            return RedemptionResult {
                succeeded: true,
                items_granted,
                error_code: None,
            };
        }

        let raw_code = self.purchase_result_details.or_else(|| {
            self.purchase_receipt_info
                .as_ref()
                .and_then(|receipt| receipt.result_detail)
        });
        RedemptionResult {
            succeeded: false,
            items_granted: Vec::new(),
            error_code: Some(normalize_error_code(raw_code)),
        }
    }
}

/// Outcome of one redemption attempt that reached the storefront.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedemptionResult {
    /// Whether the key was redeemed.
    pub succeeded: bool,
    /// Descriptions of granted products, in receipt order. Empty on failure.
    pub items_granted: Vec<String>,
    /// Normalized result code on failure.
    pub error_code: Option<i64>,
}

impl RedemptionResult {
    /// A successful redemption granting `items`.
    #[must_use]
    pub fn success(items: Vec<String>) -> Self {
        Self {
            succeeded: true,
            items_granted: items,
            error_code: None,
        }
    }

    /// A failed redemption with the given result code.
    #[must_use]
    pub fn failure(code: i64) -> Self {
        Self {
            succeeded: false,
            items_granted: Vec::new(),
            error_code: Some(code),
        }
    }

    /// Taxonomy entry for a failed attempt.
    #[must_use]
    pub fn error_entry(&self) -> Option<ErrorTaxonomyEntry> {
        if self.succeeded {
            return None;
        }
        Some(classify(normalize_error_code(self.error_code)))
    }

    /// Operator-facing message for a failed attempt.
    #[must_use]
    pub fn error_message(&self) -> Option<&'static str> {
        self.error_entry().map(|entry| entry.message)
    }

    /// Returns true when the storefront throttled the attempt.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        self.error_entry()
            .is_some_and(|entry| entry.is_rate_limited())
    }
}
