use shared::{
    domain::{RecipeId, TagId},
    protocol::{RecipeSummary, TagSummary},
};

mod http_api_tests;

fn tag(id: i64, slug: &str) -> TagSummary {
    TagSummary {
        id: TagId(id),
        name: slug.to_string(),
        slug: slug.to_string(),
    }
}

fn recipe(id: i64, name: &str) -> RecipeSummary {
    RecipeSummary {
        id: RecipeId(id),
        name: name.to_string(),
        image: None,
        cooking_time: 30,
        tags: Vec::new(),
        ingredients: Vec::new(),
        is_favorited: false,
        is_in_shopping_cart: false,
        created_at: Some("2024-01-01T00:00:00Z".parse().expect("timestamp")),
    }
}
