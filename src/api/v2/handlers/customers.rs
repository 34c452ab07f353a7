/*
 * Responsibility
 * - GET /api/v2/customers
 * - anonymous 許可ルート（route policy 側で宣言）。トークン無しで到達できる
 */

pub async fn get_customers() -> &'static str {
    "Hello Customers"
}
