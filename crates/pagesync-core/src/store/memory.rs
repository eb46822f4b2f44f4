use super::{PageProperties, RemoteId, RemoteStore};
use crate::blocks::Block;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// A page held by [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct StoredPage {
    /// Page id.
    pub id: RemoteId,
    /// Owning database.
    pub database: RemoteId,
    /// Parent page, `None` for database entries.
    pub parent: Option<RemoteId>,
    /// Current properties.
    pub properties: PageProperties,
    /// Current content.
    pub blocks: Vec<Block>,
}

/// One recorded append request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendCall {
    /// Target page.
    pub page: RemoteId,
    /// Blocks in the request.
    pub len: usize,
}

#[derive(Default)]
struct State {
    next_id: usize,
    databases: Vec<(RemoteId, String)>,
    pages: Vec<StoredPage>,
    appends: Vec<AppendCall>,
    #[cfg(test)]
    failures: Vec<(String, fn() -> Error)>,
}

impl State {
    fn mint(&mut self, prefix: &str) -> RemoteId {
        self.next_id += 1;
        RemoteId::new(format!("mem-{prefix}-{}", self.next_id))
    }

    fn page_mut(&mut self, id: &RemoteId) -> Result<&mut StoredPage> {
        self.pages
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or_else(|| Error::NotFound(format!("page {id}")))
    }
}

/// In-process [`RemoteStore`] used for dry runs and tests.
///
/// Lookups follow the same rules as the Notion store: every page is found by
/// its source URL, within the database or under its parent page.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| Error::Other("memory store lock poisoned".into()))
    }

    /// Snapshot of every stored page, in creation order.
    pub fn pages(&self) -> Vec<StoredPage> {
        self.state().map(|s| s.pages.clone()).unwrap_or_default()
    }

    /// Stored page for a URL.
    pub fn page_by_url(&self, url: &str) -> Option<StoredPage> {
        self.pages().into_iter().find(|p| p.properties.url == url)
    }

    /// Every append request, in order.
    pub fn append_calls(&self) -> Vec<AppendCall> {
        self.state().map(|s| s.appends.clone()).unwrap_or_default()
    }

    /// Number of databases created.
    pub fn database_count(&self) -> usize {
        self.state().map(|s| s.databases.len()).unwrap_or_default()
    }

    /// Make every write for `url` fail with the error built by `make`.
    #[cfg(test)]
    pub(crate) fn fail_writes_for(&self, url: &str, make: fn() -> Error) {
        if let Ok(mut state) = self.state() {
            state.failures.push((url.to_string(), make));
        }
    }

    #[cfg(test)]
    fn check_failure(state: &State, url: &str) -> Result<()> {
        match state.failures.iter().find(|(u, _)| u == url) {
            Some((_, make)) => Err(make()),
            None => Ok(()),
        }
    }

    #[cfg(not(test))]
    #[allow(clippy::unnecessary_wraps)]
    const fn check_failure(_state: &State, _url: &str) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn ensure_database(&self, title: &str) -> Result<RemoteId> {
        let mut state = self.state()?;
        if let Some((id, _)) = state.databases.iter().find(|(_, t)| t == title) {
            return Ok(id.clone());
        }
        let id = state.mint("db");
        state.databases.push((id.clone(), title.to_string()));
        debug!(database = %id, title, "created database");
        Ok(id)
    }

    async fn find_page(
        &self,
        database: &RemoteId,
        parent: Option<&RemoteId>,
        props: &PageProperties,
    ) -> Result<Option<RemoteId>> {
        let state = self.state()?;
        let found = state.pages.iter().find(|p| {
            &p.database == database && p.parent.as_ref() == parent && p.properties.url == props.url
        });
        Ok(found.map(|p| p.id.clone()))
    }

    async fn create_page(
        &self,
        database: &RemoteId,
        parent: Option<&RemoteId>,
        props: &PageProperties,
    ) -> Result<RemoteId> {
        let mut state = self.state()?;
        Self::check_failure(&state, &props.url)?;
        let id = state.mint("page");
        state.pages.push(StoredPage {
            id: id.clone(),
            database: database.clone(),
            parent: parent.cloned(),
            properties: props.clone(),
            blocks: Vec::new(),
        });
        Ok(id)
    }

    async fn update_page(
        &self,
        page: &RemoteId,
        _parent: Option<&RemoteId>,
        props: &PageProperties,
    ) -> Result<()> {
        let mut state = self.state()?;
        Self::check_failure(&state, &props.url)?;
        state.page_mut(page)?.properties = props.clone();
        Ok(())
    }

    async fn clear_content(&self, page: &RemoteId) -> Result<()> {
        self.state()?.page_mut(page)?.blocks.clear();
        Ok(())
    }

    async fn append_blocks(&self, page: &RemoteId, blocks: &[Block]) -> Result<()> {
        let mut state = self.state()?;
        state.page_mut(page)?.blocks.extend_from_slice(blocks);
        state.appends.push(AppendCall {
            page: page.clone(),
            len: blocks.len(),
        });
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::blocks::RichText;
    use crate::classify::ContentType;
    use chrono::Utc;

    fn props(url: &str, title: &str) -> PageProperties {
        PageProperties {
            title: title.into(),
            url: url.into(),
            last_synced: Utc::now(),
            content_type: ContentType::HtmlPage,
        }
    }

    #[tokio::test]
    async fn test_database_is_reused_by_title() {
        let store = MemoryStore::new();
        let a = store.ensure_database("site-gh-pages").await.unwrap();
        let b = store.ensure_database("site-gh-pages").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.database_count(), 1);
    }

    #[tokio::test]
    async fn test_lookup_rules() {
        // Given: a database entry and a nested page
        let store = MemoryStore::new();
        let db = store.ensure_database("d").await.unwrap();
        let root_props = props("https://o.github.io/s/", "Home");
        let root = store.create_page(&db, None, &root_props).await.unwrap();
        let child_props = props("https://o.github.io/s/a.html", "A");
        let child = store.create_page(&db, Some(&root), &child_props).await.unwrap();

        // Then: both are found by URL; a sibling sharing the title is not a match
        assert_eq!(store.find_page(&db, None, &root_props).await.unwrap(), Some(root.clone()));
        assert_eq!(
            store.find_page(&db, Some(&root), &child_props).await.unwrap(),
            Some(child.clone())
        );
        assert_eq!(
            store
                .find_page(&db, Some(&root), &props("https://o.github.io/s/b.html", "A"))
                .await
                .unwrap(),
            None
        );

        // And: a renamed page is still found
        assert_eq!(
            store
                .find_page(&db, Some(&root), &props("https://o.github.io/s/a.html", "Renamed"))
                .await
                .unwrap(),
            Some(child)
        );
    }

    #[tokio::test]
    async fn test_clear_and_append() {
        let store = MemoryStore::new();
        let db = store.ensure_database("d").await.unwrap();
        let page = store.create_page(&db, None, &props("u", "t")).await.unwrap();

        let blocks = vec![Block::paragraph(RichText::plain("one"))];
        store.append_blocks(&page, &blocks).await.unwrap();
        store.clear_content(&page).await.unwrap();
        store.append_blocks(&page, &blocks).await.unwrap();

        assert_eq!(store.page_by_url("u").unwrap().blocks, blocks);
        assert_eq!(store.append_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryStore::new();
        let db = store.ensure_database("d").await.unwrap();
        store.fail_writes_for("bad", || Error::Unauthorized("token revoked".into()));

        let err = store.create_page(&db, None, &props("bad", "t")).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(store.create_page(&db, None, &props("good", "t")).await.is_ok());
    }
}
