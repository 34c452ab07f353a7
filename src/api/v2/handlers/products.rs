/*
 * Responsibility
 * - GET /api/v2/products
 * - `products:read` authority が必要（route policy 側で宣言）
 * - AuthCtx extractor 経由で認証済みコンテキストを受け取る例
 */
use crate::api::v2::extractors::AuthCtxExtractor;

pub async fn get_products(AuthCtxExtractor(ctx): AuthCtxExtractor) -> &'static str {
    tracing::debug!(subject = ?ctx.subject, "serving products");
    "Hello Products"
}
