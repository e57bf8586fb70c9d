use std::{sync::Arc, time::Duration};

use axum::{
    extract::{Path, RawQuery, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use shared::{
    domain::{RecipeId, UserId},
    error::{ApiError, ApiException, ErrorCode},
    protocol::{AuthToken, RecipePage, SignInCredentials, SignUpRequest, TagSummary, UserSummary},
};
use tokio::{net::TcpListener, sync::Mutex};

use super::{recipe, tag};
use crate::{
    forms::{SignInForm, SignUpForm},
    view, AuthSession, HttpRecipeApi, RecipeApi, RecipeListController,
};

#[derive(Clone, Default)]
struct ApiServerState {
    recipe_queries: Arc<Mutex<Vec<String>>>,
    auth_headers: Arc<Mutex<Vec<Option<String>>>>,
    favorite_posts: Arc<Mutex<Vec<i64>>>,
    logins: Arc<Mutex<Vec<SignInCredentials>>>,
    signups: Arc<Mutex<Vec<SignUpRequest>>>,
}

async fn handle_recipes(
    State(state): State<ApiServerState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Json<RecipePage> {
    state
        .recipe_queries
        .lock()
        .await
        .push(query.unwrap_or_default());
    state.auth_headers.lock().await.push(
        headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
    );
    Json(RecipePage {
        count: 12,
        results: vec![recipe(1, "borscht"), recipe(2, "syrniki")],
    })
}

async fn handle_tags() -> Json<Vec<TagSummary>> {
    Json(vec![tag(1, "breakfast"), tag(2, "lunch"), tag(3, "dinner")])
}

async fn handle_favorite(
    State(state): State<ApiServerState>,
    Path(recipe_id): Path<i64>,
) -> StatusCode {
    state.favorite_posts.lock().await.push(recipe_id);
    StatusCode::CREATED
}

async fn handle_cart(Path(_recipe_id): Path<i64>) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(ApiError::new(
            ErrorCode::Unauthorized,
            "authentication credentials were not provided",
        )),
    )
}

async fn handle_login(
    State(state): State<ApiServerState>,
    Json(credentials): Json<SignInCredentials>,
) -> Json<AuthToken> {
    state.logins.lock().await.push(credentials);
    Json(AuthToken {
        auth_token: "token-abc".to_string(),
    })
}

async fn handle_signup(
    State(state): State<ApiServerState>,
    Json(request): Json<SignUpRequest>,
) -> (StatusCode, Json<UserSummary>) {
    let user = UserSummary {
        id: UserId(5),
        username: request.username.clone(),
        first_name: request.first_name.clone(),
        last_name: request.last_name.clone(),
        email: request.email.clone(),
    };
    state.signups.lock().await.push(request);
    (StatusCode::CREATED, Json(user))
}

async fn spawn_api_server() -> anyhow::Result<(String, ApiServerState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = ApiServerState::default();
    let app = Router::new()
        .route("/api/recipes/", get(handle_recipes))
        .route("/api/tags/", get(handle_tags))
        .route("/api/recipes/:id/favorite/", post(handle_favorite))
        .route("/api/recipes/:id/shopping_cart/", post(handle_cart))
        .route("/api/auth/token/login/", post(handle_login))
        .route("/api/users/", post(handle_signup))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), state))
}

#[tokio::test]
async fn list_recipes_sends_page_and_tag_slugs() {
    let (server_url, state) = spawn_api_server().await.expect("spawn server");
    let session = Arc::new(AuthSession::new());
    let api = HttpRecipeApi::new(&server_url, session).expect("api");

    let page = api
        .list_recipes(2, &[tag(1, "breakfast"), tag(3, "dinner")])
        .await
        .expect("fetch");
    assert_eq!(page.count, 12);
    assert_eq!(page.results.len(), 2);

    let queries = state.recipe_queries.lock().await;
    assert_eq!(queries.len(), 1);
    assert!(queries[0].contains("page=2"));
    assert!(queries[0].contains("tags=breakfast"));
    assert!(queries[0].contains("tags=dinner"));
}

#[tokio::test]
async fn authorized_requests_carry_the_session_token() {
    let (server_url, state) = spawn_api_server().await.expect("spawn server");
    let session = Arc::new(AuthSession::new());
    let api = HttpRecipeApi::new(&server_url, session.clone()).expect("api");

    api.list_recipes(1, &[]).await.expect("anonymous fetch");
    session.set_authenticated("token-abc", None).await;
    api.list_recipes(1, &[]).await.expect("authorized fetch");

    let headers = state.auth_headers.lock().await;
    assert_eq!(headers[0], None);
    assert_eq!(headers[1], Some("Token token-abc".to_string()));
}

#[tokio::test]
async fn sign_in_flow_authenticates_the_session_and_notifies_observers() {
    let (server_url, state) = spawn_api_server().await.expect("spawn server");
    let session = Arc::new(AuthSession::new());
    let api = HttpRecipeApi::new(&server_url, session.clone()).expect("api");

    let mut redirect = session.subscribe();
    assert!(!*redirect.borrow());

    let mut form = SignInForm::new();
    form.set_email("alice@example.com");
    form.set_password("hunter2");
    let credentials = form.submit().expect("valid form");

    let token = api.sign_in(&credentials).await.expect("sign in");
    session.set_authenticated(token.auth_token, None).await;

    tokio::time::timeout(Duration::from_secs(1), redirect.changed())
        .await
        .expect("notification timeout")
        .expect("sender alive");
    assert!(*redirect.borrow());
    assert!(session.is_authenticated().await);
    assert_eq!(session.current_token().await.as_deref(), Some("token-abc"));

    let logins = state.logins.lock().await;
    assert_eq!(logins.len(), 1);
    assert_eq!(logins[0].email, "alice@example.com");
}

#[tokio::test]
async fn sign_up_posts_all_required_fields() {
    let (server_url, state) = spawn_api_server().await.expect("spawn server");
    let session = Arc::new(AuthSession::new());
    let api = HttpRecipeApi::new(&server_url, session).expect("api");

    let mut form = SignUpForm::new();
    form.set_first_name("Bob");
    form.set_last_name("Builder");
    form.set_username("bob");
    form.set_email("bob@example.com");
    form.set_password("hunter2");
    let request = form.submit().expect("valid form");

    let user = api.sign_up(&request).await.expect("sign up");
    assert_eq!(user.username, "bob");
    assert_eq!(user.id, UserId(5));

    let signups = state.signups.lock().await;
    assert_eq!(signups.len(), 1);
    assert_eq!(signups[0].email, "bob@example.com");
}

#[tokio::test]
async fn server_error_bodies_surface_as_typed_errors() {
    let (server_url, _state) = spawn_api_server().await.expect("spawn server");
    let session = Arc::new(AuthSession::new());
    let api = HttpRecipeApi::new(&server_url, session).expect("api");

    let error = api
        .add_to_cart(RecipeId(1))
        .await
        .expect_err("rejected mutation");
    let exception = error
        .downcast_ref::<ApiException>()
        .expect("typed api error");
    assert!(matches!(exception.code, ErrorCode::Unauthorized));
    assert_eq!(
        exception.message,
        "authentication credentials were not provided"
    );
}

#[tokio::test]
async fn controller_mount_flow_over_http() {
    let (server_url, state) = spawn_api_server().await.expect("spawn server");
    let session = Arc::new(AuthSession::new());
    let api = Arc::new(HttpRecipeApi::new(&server_url, session).expect("api"));
    let controller = RecipeListController::new(api);

    controller.load_tags().await.expect("tag catalog");
    controller.sync().await.expect("initial fetch");

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.recipes.len(), 2);
    assert_eq!(snapshot.total_count, 12);
    assert_eq!(snapshot.tags.len(), 3);
    assert!(snapshot.tags.iter().all(|entry| entry.active));

    let home = view::home_view(&snapshot);
    assert_eq!(home.pagination.page_count, 2);
    assert!(home.pagination.has_next);
    assert!(!home.pagination.has_previous);

    controller
        .toggle_favorite(RecipeId(1))
        .await
        .expect("favorite over http");
    assert_eq!(state.favorite_posts.lock().await.clone(), vec![1]);
    assert!(controller.recipes().await[0].is_favorited);
}
