/*
 * Responsibility
 * - v2 の URL 構造を定義
 * - どのルートがどの authority を要求するかは route policy 側（app.rs）で宣言する
 */
use axum::{Router, routing::get};

use crate::state::AppState;

use crate::api::v2::handlers::{customers::get_customers, products::get_products};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/customers", get(get_customers))
        .route("/products", get(get_products))
}
