//! Relations between standard platform objects.
//!
//! Base application tables and pages never appear in a project's source
//! tree, yet extensions routinely target them. The catalog records which
//! standard tables belong to the same document family (so a field added to
//! `Sales Header` should also exist on `Sales Invoice Header`) and which
//! standard pages show each table.

use once_cell::sync::Lazy;
use std::collections::HashMap;

const TABLE_GROUPS: &[&[&str]] = &[
    &[
        "Sales Header",
        "Sales Header Archive",
        "Sales Shipment Header",
        "Sales Invoice Header",
        "Sales Cr.Memo Header",
        "Return Receipt Header",
    ],
    &[
        "Sales Line",
        "Sales Line Archive",
        "Sales Shipment Line",
        "Sales Invoice Line",
        "Sales Cr.Memo Line",
        "Return Receipt Line",
    ],
    &[
        "Purchase Header",
        "Purchase Header Archive",
        "Purch. Rcpt. Header",
        "Purch. Inv. Header",
        "Purch. Cr. Memo Hdr.",
        "Return Shipment Header",
    ],
    &[
        "Purchase Line",
        "Purchase Line Archive",
        "Purch. Rcpt. Line",
        "Purch. Inv. Line",
        "Purch. Cr. Memo Line",
        "Return Shipment Line",
    ],
    &[
        "Service Header",
        "Service Shipment Header",
        "Service Invoice Header",
        "Service Cr.Memo Header",
    ],
    &[
        "Service Line",
        "Service Shipment Line",
        "Service Invoice Line",
        "Service Cr.Memo Line",
    ],
    &[
        "Transfer Header",
        "Transfer Shipment Header",
        "Transfer Receipt Header",
    ],
    &[
        "Transfer Line",
        "Transfer Shipment Line",
        "Transfer Receipt Line",
    ],
    &["Gen. Journal Line", "G/L Entry"],
    &["Gen. Journal Line", "Cust. Ledger Entry"],
    &["Gen. Journal Line", "Vendor Ledger Entry"],
    &["Item Journal Line", "Item Ledger Entry", "Value Entry"],
    &["Customer", "Customer Templ."],
    &["Vendor", "Vendor Templ."],
    &["Item", "Item Templ."],
];

const TABLE_PAGES: &[(&str, &[&str])] = &[
    ("Customer", &["Customer Card", "Customer List"]),
    ("Vendor", &["Vendor Card", "Vendor List"]),
    ("Item", &["Item Card", "Item List"]),
    ("Customer Templ.", &["Customer Templ. Card"]),
    ("Vendor Templ.", &["Vendor Templ. Card"]),
    ("Item Templ.", &["Item Templ. Card"]),
    (
        "Sales Header",
        &[
            "Sales Quote",
            "Sales Order",
            "Sales Invoice",
            "Sales Credit Memo",
            "Sales Return Order",
            "Sales Order List",
            "Sales Invoice List",
        ],
    ),
    (
        "Sales Line",
        &[
            "Sales Quote Subform",
            "Sales Order Subform",
            "Sales Invoice Subform",
            "Sales Cr. Memo Subform",
            "Sales Return Order Subform",
        ],
    ),
    ("Sales Header Archive", &["Sales Order Archive"]),
    ("Sales Line Archive", &["Sales Order Archive Subform"]),
    ("Sales Shipment Header", &["Posted Sales Shipment"]),
    ("Sales Shipment Line", &["Posted Sales Shpt. Subform"]),
    (
        "Sales Invoice Header",
        &["Posted Sales Invoice", "Posted Sales Invoices"],
    ),
    ("Sales Invoice Line", &["Posted Sales Invoice Subform"]),
    ("Sales Cr.Memo Header", &["Posted Sales Credit Memo"]),
    ("Sales Cr.Memo Line", &["Posted Sales Cr. Memo Subform"]),
    ("Return Receipt Header", &["Posted Return Receipt"]),
    (
        "Purchase Header",
        &[
            "Purchase Quote",
            "Purchase Order",
            "Purchase Invoice",
            "Purchase Credit Memo",
            "Purchase Return Order",
            "Purchase Order List",
        ],
    ),
    (
        "Purchase Line",
        &[
            "Purchase Quote Subform",
            "Purchase Order Subform",
            "Purch. Invoice Subform",
            "Purch. Cr. Memo Subform",
        ],
    ),
    ("Purchase Header Archive", &["Purchase Order Archive"]),
    ("Purch. Rcpt. Header", &["Posted Purchase Receipt"]),
    ("Purch. Inv. Header", &["Posted Purchase Invoice"]),
    ("Purch. Inv. Line", &["Posted Purch. Invoice Subform"]),
    ("Purch. Cr. Memo Hdr.", &["Posted Purchase Credit Memo"]),
    ("Service Header", &["Service Order", "Service Invoice"]),
    ("Transfer Header", &["Transfer Order"]),
    ("Transfer Line", &["Transfer Order Subform"]),
    ("Gen. Journal Line", &["General Journal"]),
    ("G/L Entry", &["General Ledger Entries"]),
    ("Cust. Ledger Entry", &["Customer Ledger Entries"]),
    ("Vendor Ledger Entry", &["Vendor Ledger Entries"]),
    ("Item Journal Line", &["Item Journal"]),
    ("Item Ledger Entry", &["Item Ledger Entries"]),
];

static BUILTIN: Lazy<RelationCatalog> = Lazy::new(|| {
    let mut catalog = RelationCatalog::empty();
    for group in TABLE_GROUPS {
        catalog.add_table_group(group.iter().copied());
    }
    for (table, pages) in TABLE_PAGES {
        for page in *pages {
            catalog.add_page(table, page);
        }
    }
    catalog
});

#[derive(Debug, Clone, Default)]
pub struct RelationCatalog {
    groups: Vec<Vec<String>>,
    pages_by_table: HashMap<String, Vec<String>>,
    table_by_page: HashMap<String, String>,
}

impl RelationCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The standard base-application relations.
    pub fn builtin() -> &'static RelationCatalog {
        &BUILTIN
    }

    pub fn add_table_group<I, S>(&mut self, tables: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let group: Vec<String> = tables.into_iter().map(Into::into).collect();
        if group.len() > 1 {
            self.groups.push(group);
        }
    }

    pub fn add_page(&mut self, table: &str, page: &str) {
        let pages = self.pages_by_table.entry(table.to_string()).or_default();
        if !pages.iter().any(|p| p == page) {
            pages.push(page.to_string());
        }
        self.table_by_page
            .insert(page.to_string(), table.to_string());
    }

    pub fn knows_table(&self, name: &str) -> bool {
        self.pages_by_table.contains_key(name) || self.groups.iter().any(|g| g.iter().any(|t| t == name))
    }

    pub fn knows_page(&self, name: &str) -> bool {
        self.table_by_page.contains_key(name)
    }

    /// Tables sharing a document family with `table`, excluding `table` itself.
    pub fn related_tables(&self, table: &str) -> Vec<&str> {
        let mut related: Vec<&str> = Vec::new();
        for group in self.groups.iter().filter(|g| g.iter().any(|t| t == table)) {
            for t in group {
                if t != table && !related.contains(&t.as_str()) {
                    related.push(t);
                }
            }
        }
        related
    }

    pub fn pages_of(&self, table: &str) -> &[String] {
        self.pages_by_table
            .get(table)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn table_of(&self, page: &str) -> Option<&str> {
        self.table_by_page.get(page).map(String::as_str)
    }
}
