// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Pupae sales ledger and the point-of-sale order flow

use chrono::{DateTime, Local};
use minijinja::{context, Environment};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::catalog::species_info;
use crate::store::{self, CsvRecord};
use crate::{LepiError, Result};

pub const SALES_FILE: &str = "purchasers.csv";
pub const PURCHASES_FILE: &str = "butterfly_purchases.csv";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Buyer companies offered by the sales form
pub const COMPANIES: &[&str] = &[
    "Butterfly World Inc.",
    "Winged Wonders Ltd.",
    "Nature's Flight Co.",
    "Moth & More",
    "Flutterby Farms",
    "Papilio Partners",
    OTHER_COMPANY,
];

pub const OTHER_COMPANY: &str = "Other";

/// One recorded pupae sale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRecord {
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "Seller")]
    pub seller: String,
    #[serde(rename = "Purchaser Name")]
    pub purchaser: String,
    #[serde(rename = "Company")]
    pub company: String,
    #[serde(rename = "Quantity")]
    pub quantity: u32,
    #[serde(rename = "Species")]
    pub species: String,
}

impl CsvRecord for SaleRecord {
    const HEADERS: &'static [&'static str] =
        &["Timestamp", "Seller", "Purchaser Name", "Company", "Quantity", "Species"];
}

/// Sale as entered on the form
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaleForm {
    pub purchaser: String,
    pub company: String,
    #[serde(default)]
    pub other_company: Option<String>,
    pub quantity: u32,
    pub species: String,
}

impl SaleForm {
    /// Validate the form and stamp it with the seller and time
    pub fn into_record(self, seller: &str, at: DateTime<Local>) -> Result<SaleRecord> {
        let purchaser = self.purchaser.trim();
        if purchaser.is_empty() {
            return Err(LepiError::Validation("Please enter the Purchaser/Buyer Name.".to_string()));
        }
        if !COMPANIES.iter().any(|c| *c == self.company) {
            return Err(LepiError::Validation(format!("Unknown company: {}", self.company)));
        }
        if self.quantity < 1 {
            return Err(LepiError::Validation("Quantity must be at least 1.".to_string()));
        }
        if species_info(&self.species).is_none() {
            return Err(LepiError::Validation(format!("Unknown species: {}", self.species)));
        }

        let company = if self.company == OTHER_COMPANY {
            self.other_company
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .ok_or_else(|| {
                    LepiError::Validation(
                        "Please enter the Company Name for 'Other' selection.".to_string(),
                    )
                })?
                .to_string()
        } else {
            self.company.clone()
        };

        Ok(SaleRecord {
            timestamp: at.format(TIMESTAMP_FORMAT).to_string(),
            seller: seller.to_string(),
            purchaser: purchaser.to_string(),
            company,
            quantity: self.quantity,
            species: self.species,
        })
    }
}

pub fn record_sale(path: &Path, sale: &SaleRecord) -> Result<()> {
    store::append_record(path, sale)?;
    info!("Recorded sale of {} {} to {}", sale.quantity, sale.species, sale.purchaser);
    Ok(())
}

/// Sales newest first, optionally only those of one seller
pub fn load_sales(path: &Path, seller: Option<&str>) -> Result<Vec<SaleRecord>> {
    let mut sales: Vec<SaleRecord> = store::load_records(path)?;
    if let Some(seller) = seller {
        sales.retain(|s| s.seller == seller);
    }
    sales.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    Ok(sales)
}

/// An item in the point-of-sale catalog
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PosItem {
    pub id: u32,
    pub name: &'static str,
    pub price: u32,
}

const fn pos_item(id: u32, name: &'static str, price: u32) -> PosItem {
    PosItem { id, name, price }
}

pub const ITEMS: &[PosItem] = &[
    pos_item(1, "Clipper", 23),
    pos_item(2, "Common Jay", 35),
    pos_item(3, "Common Lime", 43),
    pos_item(4, "Common Mime", 65),
    pos_item(5, "Common Mormon", 48),
    pos_item(6, "Emerald Swallowtail", 65),
    pos_item(7, "Gray Glassy Tiger", 78),
    pos_item(8, "Great Eggfly", 89),
    pos_item(9, "Great Yellow Mormon", 71),
    pos_item(10, "Golden Birdwing", 73),
    pos_item(11, "Paper Kite", 81),
    pos_item(12, "Pink Rose", 34),
    pos_item(13, "Plain Tiger", 39),
    pos_item(14, "Red Lacewing", 100),
    pos_item(15, "Scarlet Mormon", 85),
    pos_item(16, "Tailed Jay", 45),
    pos_item(17, "Atlas Moth", 75),
    pos_item(18, "Giant Silk Moth", 80),
];

pub fn item(id: u32) -> Option<&'static PosItem> {
    ITEMS.iter().find(|i| i.id == id)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderLine {
    pub item_id: u32,
    pub name: String,
    pub price: u32,
    pub quantity: u32,
    pub subtotal: u64,
}

/// An order being assembled at the point of sale
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub number: u32,
    pub lines: Vec<OrderLine>,
}

impl Default for Order {
    fn default() -> Self {
        Self::new()
    }
}

impl Order {
    /// Empty order with a random six-digit number
    pub fn new() -> Self {
        Self {
            number: rand::thread_rng().gen_range(100_000..=999_999),
            lines: Vec::new(),
        }
    }

    pub fn add(&mut self, item_id: u32, quantity: u32) -> Result<&OrderLine> {
        let item =
            item(item_id).ok_or_else(|| LepiError::Validation("Invalid item ID.".to_string()))?;
        if quantity < 1 {
            return Err(LepiError::Validation("Quantity must be at least 1.".to_string()));
        }

        self.lines.push(OrderLine {
            item_id,
            name: item.name.to_string(),
            price: item.price,
            quantity,
            subtotal: u64::from(item.price) * u64::from(quantity),
        });
        Ok(&self.lines[self.lines.len() - 1])
    }

    pub fn total(&self) -> u64 {
        self.lines.iter().map(|l| l.subtotal).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// One order line as written to the purchase history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "OR")]
    pub order_number: u32,
    #[serde(rename = "Image_Filename")]
    pub image_filename: String,
    #[serde(rename = "Quantity")]
    pub quantity: u32,
    #[serde(rename = "Classification_Code")]
    pub classification_code: u32,
    #[serde(rename = "Amount")]
    pub amount: u64,
    /// Total of the whole order
    #[serde(rename = "Subtotal")]
    pub subtotal: u64,
}

impl CsvRecord for PurchaseRecord {
    const HEADERS: &'static [&'static str] =
        &["Date", "OR", "Image_Filename", "Quantity", "Classification_Code", "Amount", "Subtotal"];
}

/// A completed purchase
#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    pub order_number: u32,
    pub date_time: String,
    pub lines: Vec<OrderLine>,
    pub total: u64,
    /// Image shown on the receipt, as a data URI
    pub image: Option<String>,
}

pub fn money(amount: u64) -> String {
    format!("${:.2}", amount as f64)
}

const RECEIPT_TEMPLATE: &str = include_str!("../templates/receipt.html");

impl Receipt {
    /// Printable HTML receipt
    pub fn to_html(&self) -> Result<String> {
        let mut env = Environment::new();
        env.add_template("receipt.html", RECEIPT_TEMPLATE)?;
        let lines: Vec<_> = self
            .lines
            .iter()
            .map(|l| {
                context! { quantity => l.quantity, name => l.name, subtotal => money(l.subtotal) }
            })
            .collect();
        let html = env.get_template("receipt.html")?.render(context! {
            order_number => self.order_number,
            date_time => self.date_time,
            image => self.image,
            lines => lines,
            total => money(self.total),
        })?;
        Ok(html)
    }
}

/// Write one purchase row per order line and produce the receipt
pub fn complete_purchase(
    path: &Path,
    order: &Order,
    image_filename: Option<&str>,
    image: Option<String>,
    at: DateTime<Local>,
) -> Result<Receipt> {
    if order.is_empty() {
        return Err(LepiError::Validation(
            "Please add items to your cart before completing the purchase.".to_string(),
        ));
    }

    let date_time = at.format(TIMESTAMP_FORMAT).to_string();
    let total = order.total();
    for line in &order.lines {
        store::append_record(
            path,
            &PurchaseRecord {
                date: date_time.clone(),
                order_number: order.number,
                image_filename: image_filename.unwrap_or("N/A").to_string(),
                quantity: line.quantity,
                classification_code: line.item_id,
                amount: line.subtotal,
                subtotal: total,
            },
        )?;
    }
    info!("Completed order #{} for {}", order.number, total);

    Ok(Receipt {
        order_number: order.number,
        date_time,
        lines: order.lines.clone(),
        total,
        image,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at(hour: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 7, 1, hour, 0, 0).unwrap()
    }

    fn form(company: &str, other: Option<&str>) -> SaleForm {
        SaleForm {
            purchaser: "Ana".to_string(),
            company: company.to_string(),
            other_company: other.map(String::from),
            quantity: 10,
            species: "Butterfly-Paper Kite".to_string(),
        }
    }

    #[test]
    fn test_sale_form_validation() {
        let mut blank = form("Moth & More", None);
        blank.purchaser = "  ".to_string();
        assert!(blank.into_record("farm", at(9)).is_err());

        let mut zero = form("Moth & More", None);
        zero.quantity = 0;
        assert!(zero.into_record("farm", at(9)).is_err());

        assert!(form("Acme", None).into_record("farm", at(9)).is_err());

        let sale = form("Moth & More", None).into_record("farm", at(9)).unwrap();
        assert_eq!(sale.timestamp, "2024-07-01 09:00:00");
        assert_eq!(sale.company, "Moth & More");
    }

    #[test]
    fn test_other_company_names() {
        let named = form("Other", Some(" Lepi Co ")).into_record("farm", at(9)).unwrap();
        assert_eq!(named.company, "Lepi Co");

        for blank in [None, Some(""), Some("   ")] {
            let err = form("Other", blank).into_record("farm", at(9)).unwrap_err();
            assert!(matches!(err, LepiError::Validation(msg) if msg.contains("Company Name")));
        }
    }

    #[test]
    fn test_sales_newest_first_and_filtered() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SALES_FILE);

        for (seller, hour) in [("maria", 8), ("jose", 10), ("maria", 12)] {
            let sale = form("Flutterby Farms", None).into_record(seller, at(hour)).unwrap();
            record_sale(&path, &sale).unwrap();
        }

        let all = load_sales(&path, None).unwrap();
        let hours: Vec<&str> = all.iter().map(|s| &s.timestamp[11..13]).collect();
        assert_eq!(hours, vec!["12", "10", "08"]);

        let maria = load_sales(&path, Some("maria")).unwrap();
        assert_eq!(maria.len(), 2);
        assert!(maria.iter().all(|s| s.seller == "maria"));
        assert!(load_sales(&dir.path().join("none.csv"), None).unwrap().is_empty());
    }

    #[test]
    fn test_order_totals() {
        let mut order = Order::new();
        assert!((100_000..=999_999).contains(&order.number));

        order.add(1, 2).unwrap();
        order.add(14, 1).unwrap();
        assert_eq!(order.total(), 2 * 23 + 100);

        assert!(order.add(19, 1).is_err());
        assert!(order.add(1, 0).is_err());
        assert_eq!(order.lines.len(), 2);
    }

    #[test]
    fn test_complete_purchase_writes_one_row_per_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(PURCHASES_FILE);

        let mut order = Order::new();
        order.add(2, 3).unwrap();
        order.add(17, 1).unwrap();

        let receipt = complete_purchase(&path, &order, Some("kite.jpg"), None, at(15)).unwrap();
        assert_eq!(receipt.total, 105 + 75);

        let rows: Vec<PurchaseRecord> = store::load_records(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].amount, 105);
        assert_eq!(rows[1].classification_code, 17);
        assert!(rows.iter().all(|r| r.subtotal == 180 && r.order_number == order.number));
        assert_eq!(rows[0].image_filename, "kite.jpg");

        let empty = Order::new();
        assert!(complete_purchase(&path, &empty, None, None, at(15)).is_err());
    }

    #[test]
    fn test_receipt_html() {
        let mut order = Order::new();
        order.add(3, 2).unwrap();
        let receipt = Receipt {
            order_number: order.number,
            date_time: "2024-07-01 15:00:00".to_string(),
            lines: order.lines.clone(),
            total: order.total(),
            image: None,
        };

        let html = receipt.to_html().unwrap();
        assert!(html.contains(&format!("Order No: #{}", order.number)));
        assert!(html.contains("2x Common Lime"));
        assert!(html.contains("$86.00"));
        assert!(!html.contains("<img"));
    }
}
