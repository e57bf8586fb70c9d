use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{header::AUTHORIZATION, Client};
use serde::Serialize;
use shared::{
    domain::{RecipeId, TagId},
    error::{ApiError, ApiException, ErrorCode},
    protocol::{
        AuthToken, RecipePage, RecipeSummary, SignInCredentials, SignUpRequest, TagSummary,
        UserSummary,
    },
};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};
use url::Url;

pub mod forms;
pub mod session;
pub mod view;

#[cfg(test)]
mod tests;

pub use session::AuthSession;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// REST surface the list controller and the auth pages depend on. Transport,
/// retries and auth headers are the implementation's concern.
#[async_trait]
pub trait RecipeApi: Send + Sync {
    async fn list_recipes(&self, page: u32, tags: &[TagSummary]) -> Result<RecipePage>;
    async fn list_tags(&self) -> Result<Vec<TagSummary>>;
    async fn add_favorite(&self, recipe_id: RecipeId) -> Result<()>;
    async fn remove_favorite(&self, recipe_id: RecipeId) -> Result<()>;
    async fn add_to_cart(&self, recipe_id: RecipeId) -> Result<()>;
    async fn remove_from_cart(&self, recipe_id: RecipeId) -> Result<()>;
    async fn sign_in(&self, credentials: &SignInCredentials) -> Result<AuthToken>;
    async fn sign_up(&self, request: &SignUpRequest) -> Result<UserSummary>;
}

pub struct MissingRecipeApi;

#[async_trait]
impl RecipeApi for MissingRecipeApi {
    async fn list_recipes(&self, page: u32, _tags: &[TagSummary]) -> Result<RecipePage> {
        Err(anyhow!("recipe API unavailable for page {page}"))
    }

    async fn list_tags(&self) -> Result<Vec<TagSummary>> {
        Err(anyhow!("recipe API unavailable for tag catalog"))
    }

    async fn add_favorite(&self, recipe_id: RecipeId) -> Result<()> {
        Err(anyhow!("recipe API unavailable for recipe {}", recipe_id.0))
    }

    async fn remove_favorite(&self, recipe_id: RecipeId) -> Result<()> {
        Err(anyhow!("recipe API unavailable for recipe {}", recipe_id.0))
    }

    async fn add_to_cart(&self, recipe_id: RecipeId) -> Result<()> {
        Err(anyhow!("recipe API unavailable for recipe {}", recipe_id.0))
    }

    async fn remove_from_cart(&self, recipe_id: RecipeId) -> Result<()> {
        Err(anyhow!("recipe API unavailable for recipe {}", recipe_id.0))
    }

    async fn sign_in(&self, _credentials: &SignInCredentials) -> Result<AuthToken> {
        Err(anyhow!("recipe API unavailable for sign-in"))
    }

    async fn sign_up(&self, _request: &SignUpRequest) -> Result<UserSummary> {
        Err(anyhow!("recipe API unavailable for sign-up"))
    }
}

#[derive(Serialize)]
struct RecipesQuery {
    page: u32,
}

/// reqwest-backed implementation of the recipe REST surface. Attaches the
/// session token as `Authorization: Token <token>` once one is held.
pub struct HttpRecipeApi {
    http: Client,
    base_url: Url,
    session: Arc<AuthSession>,
}

impl HttpRecipeApi {
    pub fn new(base_url: impl AsRef<str>, session: Arc<AuthSession>) -> Result<Self> {
        let mut base_url = Url::parse(base_url.as_ref()).context("invalid server base url")?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            http: Client::new(),
            base_url,
            session,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("invalid endpoint path: {path}"))
    }

    async fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.session.current_token().await {
            Some(token) => request.header(AUTHORIZATION, format!("Token {token}")),
            None => request,
        }
    }
}

/// Folds a non-success response into [`ApiException`], reading the error body
/// when the server sent one.
async fn api_result(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error = response
        .json::<ApiError>()
        .await
        .unwrap_or_else(|_| ApiError::new(ErrorCode::Internal, format!("http status {status}")));
    Err(ApiException::new(error.code, error.message).into())
}

#[async_trait]
impl RecipeApi for HttpRecipeApi {
    async fn list_recipes(&self, page: u32, tags: &[TagSummary]) -> Result<RecipePage> {
        let tag_params: Vec<(&str, &str)> =
            tags.iter().map(|tag| ("tags", tag.slug.as_str())).collect();
        let request = self
            .http
            .get(self.endpoint("api/recipes/")?)
            .query(&RecipesQuery { page })
            .query(&tag_params);
        let response = self.authorized(request).await.send().await?;
        let page = api_result(response).await?.json().await?;
        Ok(page)
    }

    async fn list_tags(&self) -> Result<Vec<TagSummary>> {
        let request = self.http.get(self.endpoint("api/tags/")?);
        let response = self.authorized(request).await.send().await?;
        let tags = api_result(response).await?.json().await?;
        Ok(tags)
    }

    async fn add_favorite(&self, recipe_id: RecipeId) -> Result<()> {
        let request = self
            .http
            .post(self.endpoint(&format!("api/recipes/{}/favorite/", recipe_id.0))?);
        let response = self.authorized(request).await.send().await?;
        api_result(response).await?;
        Ok(())
    }

    async fn remove_favorite(&self, recipe_id: RecipeId) -> Result<()> {
        let request = self
            .http
            .delete(self.endpoint(&format!("api/recipes/{}/favorite/", recipe_id.0))?);
        let response = self.authorized(request).await.send().await?;
        api_result(response).await?;
        Ok(())
    }

    async fn add_to_cart(&self, recipe_id: RecipeId) -> Result<()> {
        let request = self
            .http
            .post(self.endpoint(&format!("api/recipes/{}/shopping_cart/", recipe_id.0))?);
        let response = self.authorized(request).await.send().await?;
        api_result(response).await?;
        Ok(())
    }

    async fn remove_from_cart(&self, recipe_id: RecipeId) -> Result<()> {
        let request = self
            .http
            .delete(self.endpoint(&format!("api/recipes/{}/shopping_cart/", recipe_id.0))?);
        let response = self.authorized(request).await.send().await?;
        api_result(response).await?;
        Ok(())
    }

    async fn sign_in(&self, credentials: &SignInCredentials) -> Result<AuthToken> {
        let response = self
            .http
            .post(self.endpoint("api/auth/token/login/")?)
            .json(credentials)
            .send()
            .await?;
        let token = api_result(response).await?.json().await?;
        Ok(token)
    }

    async fn sign_up(&self, request: &SignUpRequest) -> Result<UserSummary> {
        let response = self
            .http
            .post(self.endpoint("api/users/")?)
            .json(request)
            .send()
            .await?;
        let user = api_result(response).await?.json().await?;
        Ok(user)
    }
}

#[derive(Debug, Error)]
pub enum ListError {
    #[error("page numbers are 1-indexed; got {0}")]
    InvalidPage(u32),
    #[error("unknown tag id {0}")]
    UnknownTag(i64),
    #[error("recipe {0} is not in the current page snapshot")]
    UnknownRecipe(i64),
    #[error("recipe fetch failed: {source}")]
    RecipeFetch {
        #[source]
        source: anyhow::Error,
    },
    #[error("tag catalog fetch failed: {source}")]
    TagFetch {
        #[source]
        source: anyhow::Error,
    },
    #[error("recipe mutation failed: {source}")]
    Mutation {
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Clone)]
pub enum ListEvent {
    TagsLoaded { count: usize },
    RecipesLoaded { page: u32, total_count: u64 },
    RecipeUpdated { recipe_id: RecipeId },
    FetchFailed { message: String },
}

/// One tag checkbox worth of filter state. The catalog entry itself never
/// changes after mount; only `active` flips.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFilterEntry {
    pub tag: TagSummary,
    pub active: bool,
}

/// The dependency key of a recipe fetch: the page plus the sorted set of
/// active tag ids. Inactive entries cannot influence it, so identity churn in
/// the catalog never causes a refetch.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FetchKey {
    page: u32,
    active_tag_ids: Vec<TagId>,
}

struct ListState {
    current_page: u32,
    tags: Vec<TagFilterEntry>,
    recipes: Vec<RecipeSummary>,
    total_count: u64,
    tags_fetch_attempted: bool,
    issued_fetch_seq: u64,
    last_issued_key: Option<FetchKey>,
}

impl ListState {
    fn fetch_key(&self) -> FetchKey {
        let mut active_tag_ids: Vec<TagId> = self
            .tags
            .iter()
            .filter(|entry| entry.active)
            .map(|entry| entry.tag.id)
            .collect();
        active_tag_ids.sort();
        FetchKey {
            page: self.current_page,
            active_tag_ids,
        }
    }

    fn active_tags(&self) -> Vec<TagSummary> {
        self.tags
            .iter()
            .filter(|entry| entry.active)
            .map(|entry| entry.tag.clone())
            .collect()
    }
}

/// Consistent read of the controller state, taken under a single lock.
#[derive(Debug, Clone)]
pub struct ListSnapshot {
    pub current_page: u32,
    pub total_count: u64,
    pub tags: Vec<TagFilterEntry>,
    pub recipes: Vec<RecipeSummary>,
}

/// Owns the state of the recipe listing page: current page, tag
/// filter, and the last-applied page snapshot.
///
/// Refetching is explicit rather than effect-driven: every mutator funnels
/// into [`RecipeListController::sync`], which derives a [`FetchKey`] and only
/// issues a request when the key differs from the last one issued. Each
/// request carries a sequence number; a response that is no longer the latest
/// issued is discarded, so out-of-order resolutions cannot overwrite newer
/// state.
pub struct RecipeListController {
    api: Arc<dyn RecipeApi>,
    inner: Mutex<ListState>,
    events: broadcast::Sender<ListEvent>,
}

impl RecipeListController {
    pub fn new(api: Arc<dyn RecipeApi>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            api,
            inner: Mutex::new(ListState {
                current_page: 1,
                tags: Vec::new(),
                recipes: Vec::new(),
                total_count: 0,
                tags_fetch_attempted: false,
                issued_fetch_seq: 0,
                last_issued_key: None,
            }),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ListEvent> {
        self.events.subscribe()
    }

    pub async fn current_page(&self) -> u32 {
        self.inner.lock().await.current_page
    }

    pub async fn tag_filter(&self) -> Vec<TagFilterEntry> {
        self.inner.lock().await.tags.clone()
    }

    pub async fn recipes(&self) -> Vec<RecipeSummary> {
        self.inner.lock().await.recipes.clone()
    }

    pub async fn total_count(&self) -> u64 {
        self.inner.lock().await.total_count
    }

    pub async fn snapshot(&self) -> ListSnapshot {
        let state = self.inner.lock().await;
        ListSnapshot {
            current_page: state.current_page,
            total_count: state.total_count,
            tags: state.tags.clone(),
            recipes: state.recipes.clone(),
        }
    }

    /// Fetches the tag catalog and seeds the filter with every tag active.
    /// Runs at most once per controller; the attempt is consumed even when
    /// the fetch fails, so the catalog is never re-requested.
    pub async fn load_tags(&self) -> Result<(), ListError> {
        {
            let mut state = self.inner.lock().await;
            if state.tags_fetch_attempted {
                return Ok(());
            }
            state.tags_fetch_attempted = true;
        }

        match self.api.list_tags().await {
            Ok(tags) => {
                let count = tags.len();
                {
                    let mut state = self.inner.lock().await;
                    state.tags = tags
                        .into_iter()
                        .map(|tag| TagFilterEntry { tag, active: true })
                        .collect();
                }
                info!(count, "tag catalog loaded; all tags active");
                let _ = self.events.send(ListEvent::TagsLoaded { count });
                Ok(())
            }
            Err(source) => {
                warn!("tag catalog fetch failed; filter stays empty: {source}");
                let _ = self.events.send(ListEvent::FetchFailed {
                    message: source.to_string(),
                });
                Err(ListError::TagFetch { source })
            }
        }
    }

    /// Sets the page selection and syncs. Any page >= 1 is accepted; paging
    /// past the last populated page is the server's problem and resolves to
    /// an empty snapshot.
    pub async fn set_page(&self, page: u32) -> Result<(), ListError> {
        if page == 0 {
            return Err(ListError::InvalidPage(page));
        }
        {
            self.inner.lock().await.current_page = page;
        }
        self.sync().await
    }

    /// Flips one tag's active flag. Changing the filter invalidates the
    /// current page's meaning, so the page selection resets to 1.
    pub async fn toggle_tag(&self, tag_id: TagId) -> Result<(), ListError> {
        {
            let mut state = self.inner.lock().await;
            let entry = state
                .tags
                .iter_mut()
                .find(|entry| entry.tag.id == tag_id)
                .ok_or(ListError::UnknownTag(tag_id.0))?;
            entry.active = !entry.active;
            state.current_page = 1;
        }
        self.sync().await
    }

    /// Derive key, compare, refetch if changed. Safe to call at any time;
    /// an unchanged key is a no-op. On failure the previous snapshot stays in
    /// place and the same key may be retried by a later call.
    pub async fn sync(&self) -> Result<(), ListError> {
        let (seq, page, active_tags) = {
            let mut state = self.inner.lock().await;
            let key = state.fetch_key();
            if state.last_issued_key.as_ref() == Some(&key) {
                return Ok(());
            }
            state.issued_fetch_seq += 1;
            state.last_issued_key = Some(key);
            (state.issued_fetch_seq, state.current_page, state.active_tags())
        };

        debug!(seq, page, active_tags = active_tags.len(), "recipe fetch issued");
        match self.api.list_recipes(page, &active_tags).await {
            Ok(result) => {
                let total_count = result.count;
                {
                    let mut state = self.inner.lock().await;
                    if seq != state.issued_fetch_seq {
                        debug!(
                            seq,
                            latest = state.issued_fetch_seq,
                            "discarding stale recipe fetch response"
                        );
                        return Ok(());
                    }
                    state.recipes = result.results;
                    state.total_count = total_count;
                }
                let _ = self
                    .events
                    .send(ListEvent::RecipesLoaded { page, total_count });
                Ok(())
            }
            Err(source) => {
                {
                    let mut state = self.inner.lock().await;
                    if seq != state.issued_fetch_seq {
                        debug!(
                            seq,
                            latest = state.issued_fetch_seq,
                            "discarding stale recipe fetch failure"
                        );
                        return Ok(());
                    }
                    state.last_issued_key = None;
                }
                warn!(seq, page, "recipe fetch failed; keeping previous snapshot: {source}");
                let _ = self.events.send(ListEvent::FetchFailed {
                    message: source.to_string(),
                });
                Err(ListError::RecipeFetch { source })
            }
        }
    }

    /// Forwards a like intent and flips the local flag once the API confirms.
    pub async fn toggle_favorite(&self, recipe_id: RecipeId) -> Result<(), ListError> {
        let currently = {
            let state = self.inner.lock().await;
            state
                .recipes
                .iter()
                .find(|recipe| recipe.id == recipe_id)
                .map(|recipe| recipe.is_favorited)
                .ok_or(ListError::UnknownRecipe(recipe_id.0))?
        };

        let outcome = if currently {
            self.api.remove_favorite(recipe_id).await
        } else {
            self.api.add_favorite(recipe_id).await
        };
        match outcome {
            Ok(()) => {
                let mut state = self.inner.lock().await;
                if let Some(recipe) = state.recipes.iter_mut().find(|r| r.id == recipe_id) {
                    recipe.is_favorited = !currently;
                }
                drop(state);
                let _ = self.events.send(ListEvent::RecipeUpdated { recipe_id });
                Ok(())
            }
            Err(source) => {
                warn!(recipe_id = recipe_id.0, "favorite toggle failed: {source}");
                Err(ListError::Mutation { source })
            }
        }
    }

    /// Forwards an add-to-cart intent, same confirmation rule as
    /// [`RecipeListController::toggle_favorite`].
    pub async fn toggle_cart(&self, recipe_id: RecipeId) -> Result<(), ListError> {
        let currently = {
            let state = self.inner.lock().await;
            state
                .recipes
                .iter()
                .find(|recipe| recipe.id == recipe_id)
                .map(|recipe| recipe.is_in_shopping_cart)
                .ok_or(ListError::UnknownRecipe(recipe_id.0))?
        };

        let outcome = if currently {
            self.api.remove_from_cart(recipe_id).await
        } else {
            self.api.add_to_cart(recipe_id).await
        };
        match outcome {
            Ok(()) => {
                let mut state = self.inner.lock().await;
                if let Some(recipe) = state.recipes.iter_mut().find(|r| r.id == recipe_id) {
                    recipe.is_in_shopping_cart = !currently;
                }
                drop(state);
                let _ = self.events.send(ListEvent::RecipeUpdated { recipe_id });
                Ok(())
            }
            Err(source) => {
                warn!(recipe_id = recipe_id.0, "cart toggle failed: {source}");
                Err(ListError::Mutation { source })
            }
        }
    }
}
