use super::definition::{IndexDefinition, Scope};
use crate::error::IndexError;
use crate::source::RecordSource;
use log::debug;
use std::collections::HashSet;
use std::marker::PhantomData;

/// Forward-only keyset pagination over one scope.
pub struct BatchCursor<'a, D: IndexDefinition, S> {
    source: &'a S,
    scope: &'static Scope,
    page_size: usize,
    last: Option<D::Key>,
    exhausted: bool,
    pages: usize,
    _definition: PhantomData<fn() -> D>,
}

impl<'a, D, S> BatchCursor<'a, D, S>
where
    D: IndexDefinition,
    S: RecordSource<D>,
{
    pub fn new(source: &'a S, scope: &'static Scope, page_size: usize) -> Self {
        Self {
            source,
            scope,
            page_size: page_size.max(1),
            last: None,
            exhausted: false,
            pages: 0,
            _definition: PhantomData,
        }
    }

    /// Record keys of the next page, or `None` when the scope is exhausted.
    ///
    /// Join-table scopes may name the same record more than once per page;
    /// the keys come back de-duplicated in first-seen order.
    pub async fn next_page(&mut self) -> Result<Option<Vec<D::Key>>, IndexError> {
        if self.exhausted {
            return Ok(None);
        }

        let rows = self
            .source
            .fetch_page(self.scope, self.last.clone(), self.page_size)
            .await?;

        if rows.len() < self.page_size {
            self.exhausted = true;
        }

        let Some((cursor, _)) = rows.last() else {
            return Ok(None);
        };
        self.last = Some(cursor.clone());
        self.pages += 1;

        let mut seen = HashSet::with_capacity(rows.len());
        let keys: Vec<D::Key> = rows
            .into_iter()
            .filter_map(|(_, key)| seen.insert(key.clone()).then_some(key))
            .collect();

        debug!(
            "{} {}: page {} with {} keys, cursor now {:?}",
            D::INDEX,
            self.scope.name,
            self.pages,
            keys.len(),
            self.last
        );

        Ok(Some(keys))
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    pub fn scope(&self) -> &'static Scope {
        self.scope
    }
}
