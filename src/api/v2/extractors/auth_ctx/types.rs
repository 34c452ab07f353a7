/*
 * Responsibility
 * - Handler から見える「認証済みコンテキスト」の型
 * - middleware が検証して request extensions に格納し、handler はこの型だけを受け取る
 */

use std::collections::HashSet;

/// 認証済みのリクエストに付与されるコンテキスト
///
/// - `subject` はトークンの `sub` claim（IdP 側のユーザー識別子）
/// - `authorities` は realm roles + client roles を合算した granted authority 集合。
///   route policy が既に評価済みなので、handler 側では fine-grained な追加チェックにのみ使う
#[derive(Debug, Clone)]
pub struct AuthCtx {
    pub subject: Option<String>,
    pub authorities: HashSet<String>,
}

impl AuthCtx {
    pub fn new(subject: Option<String>, authorities: HashSet<String>) -> Self {
        Self {
            subject,
            authorities,
        }
    }

    pub fn has_authority(&self, authority: &str) -> bool {
        self.authorities.contains(authority)
    }
}
