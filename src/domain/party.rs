//! Customer and stock rows from the accounting backend
//!
//! Rows arrive as loosely-typed JSON objects; every logical field is read
//! through a `FieldChain`.

use crate::domain::record::{FieldChain, Record};
use serde::Serialize;

const NAME: FieldChain = FieldChain::new(&["$Name", "MailingName", "Name"]);
const PRIMARY_GROUP: FieldChain = FieldChain::new(&["$_PrimaryGroup", "_PrimaryGroup", "PrimaryGroup"]);
const CLOSING_BALANCE: FieldChain = FieldChain::new(&["$ClosingBalance", "ClosingBalance", "Balance"]);
const ADDRESS: FieldChain = FieldChain::new(&["$Address", "Address", "$ADDRESS"]);
const PARENT: FieldChain = FieldChain::new(&["$Parent", "Parent"]);
const STOCK_NAME: FieldChain = FieldChain::new(&["$Name", "Name"]);
const STOCK_QTY: FieldChain = FieldChain::new(&["$ClosingBalance", "ClosingBalance", "ClosingQty"]);

/// Accounting classification for customer accounts with receivables
const SUNDRY_DEBTORS: &str = "sundry debtors";

/// Default number of shop suggestions shown while typing
pub const DEFAULT_SUGGESTION_LIMIT: usize = 5;

/// A customer account (shop) with its outstanding balance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Party {
    pub name: String,
    pub closing_balance: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

impl Party {
    pub fn from_record(record: &Record) -> Option<Self> {
        let name = NAME.text(record)?;
        Some(Self {
            name,
            closing_balance: CLOSING_BALANCE.number(record).unwrap_or(0.0),
            address: ADDRESS.joined_text(record),
            parent: PARENT.text(record),
        })
    }

    /// Amount pre-filled when this party is picked as the punch shop
    pub fn suggested_amount(&self) -> f64 {
        self.closing_balance.abs()
    }

    pub fn receivable(&self) -> Receivable {
        let side = if self.closing_balance < 0.0 { BalanceSide::Credit } else { BalanceSide::Debit };
        Receivable { shop: self.name.clone(), side, amount: self.closing_balance.abs() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceSide {
    Debit,
    Credit,
}

impl BalanceSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceSide::Debit => "Dr",
            BalanceSide::Credit => "Cr",
        }
    }
}

/// Outstanding balance line for display
#[derive(Debug, Clone, PartialEq)]
pub struct Receivable {
    pub shop: String,
    pub side: BalanceSide,
    pub amount: f64,
}

impl std::fmt::Display for Receivable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.shop, self.side.as_str(), self.amount)
    }
}

fn is_sundry_debtor(record: &Record) -> bool {
    PRIMARY_GROUP
        .text(record)
        .map(|g| g.to_lowercase().contains(SUNDRY_DEBTORS))
        .unwrap_or(false)
}

/// Customer accounts classified as sundry debtors, dropping rows without a name
pub fn sundry_debtors(rows: &[Record]) -> Vec<Party> {
    rows.iter().filter(|r| is_sundry_debtor(r)).filter_map(Party::from_record).collect()
}

/// Case-insensitive substring match on party name, first `limit` hits
pub fn shop_suggestions<'a>(parties: &'a [Party], query: &str, limit: usize) -> Vec<&'a Party> {
    let needle = query.trim().to_lowercase();
    parties.iter().filter(|p| p.name.to_lowercase().contains(&needle)).take(limit).collect()
}

/// Inventory line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockItem {
    pub name: String,
    pub quantity: f64,
}

/// Stock rows filtered by a case-insensitive name query
pub fn stock_items(rows: &[Record], query: &str) -> Vec<StockItem> {
    let needle = query.trim().to_lowercase();
    rows.iter()
        .filter_map(|r| {
            let name = STOCK_NAME.text(r)?;
            Some(StockItem { quantity: STOCK_QTY.number(r).unwrap_or(0.0), name })
        })
        .filter(|item| item.name.to_lowercase().contains(&needle))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn rows(value: Value) -> Vec<Record> {
        value.as_array().unwrap().iter().filter_map(|v| v.as_object().cloned()).collect()
    }

    fn sample_rows() -> Vec<Record> {
        rows(json!([
            { "$Name": "Acme Stores", "$_PrimaryGroup": "Sundry Debtors", "$ClosingBalance": "-1250" },
            { "MailingName": "Bismi Traders", "PrimaryGroup": "sundry debtors", "Balance": 300,
              "Address": ["Main Road", "Tirur"], "Parent": "Malappuram" },
            { "Name": "Power Co", "_PrimaryGroup": "Sundry Creditors", "ClosingBalance": 900 },
            { "Name": "", "PrimaryGroup": "Sundry Debtors" },
            { "Name": "Acme Hardware", "PrimaryGroup": "SUNDRY DEBTORS (North)" }
        ]))
    }

    #[test]
    fn test_sundry_debtors_filter_and_fields() {
        let parties = sundry_debtors(&sample_rows());
        let names: Vec<&str> = parties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Acme Stores", "Bismi Traders", "Acme Hardware"]);

        assert_eq!(parties[0].closing_balance, -1250.0);
        assert_eq!(parties[1].address.as_deref(), Some("Main Road, Tirur"));
        assert_eq!(parties[1].parent.as_deref(), Some("Malappuram"));
        assert_eq!(parties[2].closing_balance, 0.0);
    }

    #[test]
    fn test_shop_suggestions() {
        let parties = sundry_debtors(&sample_rows());
        let hits = shop_suggestions(&parties, "acme", DEFAULT_SUGGESTION_LIMIT);
        assert_eq!(hits.len(), 2);

        let one = shop_suggestions(&parties, "ACME", 1);
        assert_eq!(one[0].name, "Acme Stores");

        assert_eq!(shop_suggestions(&parties, "", 10).len(), 3);
    }

    #[test]
    fn test_receivable_side() {
        let parties = sundry_debtors(&sample_rows());
        assert_eq!(parties[0].receivable().side, BalanceSide::Credit);
        assert_eq!(parties[0].suggested_amount(), 1250.0);
        assert_eq!(parties[1].receivable().to_string(), "Bismi Traders Dr 300");
    }

    #[test]
    fn test_stock_items() {
        let rows = rows(json!([
            { "$Name": "Rice 5kg", "$ClosingBalance": 40 },
            { "Name": "Sugar", "ClosingQty": "12" },
            { "ClosingQty": 3 }
        ]));
        let all = stock_items(&rows, "");
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].quantity, 12.0);

        let rice = stock_items(&rows, "rice");
        assert_eq!(rice, vec![StockItem { name: "Rice 5kg".into(), quantity: 40.0 }]);
    }
}
