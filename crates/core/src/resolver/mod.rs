//! Related-object resolution.
//!
//! Given the base object an extension targets, collect every table, page and
//! extension that belongs to the same family: the base itself, its counterpart
//! (a table's pages, or a page's source table), the catalog relatives of those
//! tables, and finally every project extension registered against any of them.

pub mod catalog;

use crate::error::{CoreError, Result};
use crate::index::ProjectIndex;
use alscope_api::models::{ObjectType, RelatedObject};
use indexmap::IndexSet;

pub use catalog::RelationCatalog;

pub struct RelatedObjectResolver<'a> {
    index: &'a ProjectIndex,
    catalog: &'a RelationCatalog,
}

impl<'a> RelatedObjectResolver<'a> {
    pub fn new(index: &'a ProjectIndex, catalog: &'a RelationCatalog) -> Self {
        Self { index, catalog }
    }

    /// Resolve relatives of `extended_name`.
    ///
    /// `object_type` is the kind of the starting extension (or of the base
    /// itself). An empty `scope` means every kind.
    pub fn resolve(
        &self,
        extended_name: &str,
        object_type: ObjectType,
        scope: &[ObjectType],
    ) -> Result<Vec<RelatedObject>> {
        let base_type = object_type.base_type().unwrap_or(object_type);

        if !self.is_known(base_type, extended_name) {
            return Err(CoreError::NotFound(format!(
                "{base_type} \"{extended_name}\" is not declared in the project"
            )));
        }

        let mut found: IndexSet<(ObjectType, String)> = IndexSet::new();

        match base_type {
            ObjectType::Table => {
                found.insert((ObjectType::Table, extended_name.to_string()));
                let tables = self.table_family(extended_name);
                self.collect_family(&mut found, &tables);
            }
            ObjectType::Page => {
                found.insert((ObjectType::Page, extended_name.to_string()));
                let tables = self
                    .source_table_of(extended_name)
                    .map(|t| self.table_family(&t))
                    .unwrap_or_default();
                self.collect_family(&mut found, &tables);
            }
            other => {
                found.insert((other, extended_name.to_string()));
                if let Some(ext_type) = other.extension_type() {
                    for ext in self.index.find_extensions_of(extended_name) {
                        if ext.object_type == ext_type {
                            found.insert((ext.object_type, ext.name.clone()));
                        }
                    }
                }
            }
        }

        let related = found
            .into_iter()
            .filter(|(t, _)| scope.is_empty() || scope.contains(t))
            .map(|(t, name)| {
                let in_project = self.index.has_object(t, &name);
                RelatedObject::new(name, t, in_project)
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            "Resolved {} related object(s) for {} \"{}\"",
            related.len(),
            base_type,
            extended_name
        );
        Ok(related)
    }

    fn is_known(&self, base_type: ObjectType, name: &str) -> bool {
        if self.index.has_object(base_type, name) {
            return true;
        }
        match base_type {
            ObjectType::Table => self.catalog.knows_table(name),
            ObjectType::Page => self.catalog.knows_page(name),
            _ => false,
        }
    }

    /// `table` followed by its catalog relatives.
    fn table_family(&self, table: &str) -> Vec<String> {
        let mut tables = vec![table.to_string()];
        for related in self.catalog.related_tables(table) {
            if !tables.iter().any(|t| t == related) {
                tables.push(related.to_string());
            }
        }
        tables
    }

    fn source_table_of(&self, page: &str) -> Option<String> {
        self.index
            .find_by_name(ObjectType::Page, page)
            .into_iter()
            .find_map(|p| p.source_table.clone())
            .or_else(|| self.catalog.table_of(page).map(str::to_string))
    }

    /// Tables, then their pages, then table extensions, then page extensions.
    fn collect_family(&self, found: &mut IndexSet<(ObjectType, String)>, tables: &[String]) {
        let mut pages: Vec<String> = Vec::new();

        for table in tables {
            found.insert((ObjectType::Table, table.clone()));
        }
        for table in tables {
            let project_pages = self
                .index
                .pages_for_table(table)
                .into_iter()
                .map(|p| p.name.clone());
            let catalog_pages = self.catalog.pages_of(table).iter().cloned();
            for page in project_pages.chain(catalog_pages) {
                if !pages.contains(&page) {
                    pages.push(page);
                }
            }
        }
        for page in &pages {
            found.insert((ObjectType::Page, page.clone()));
        }

        for table in tables {
            for ext in self.index.find_extensions_of(table) {
                if ext.object_type == ObjectType::TableExtension {
                    found.insert((ext.object_type, ext.name.clone()));
                }
            }
        }
        for page in &pages {
            for ext in self.index.find_extensions_of(page) {
                if ext.object_type == ObjectType::PageExtension {
                    found.insert((ext.object_type, ext.name.clone()));
                }
            }
        }
    }
}
