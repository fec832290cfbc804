//! Naming rules for association metadata.
//!
//! Foreign keys are derived from table names: `users` becomes `user_id`, or
//! `userId` when the model does not use underscored column names.

use heck::{ToLowerCamelCase, ToSnakeCase};

/// Singular form of a table or alias name.
#[must_use]
pub fn singularize(word: &str) -> String {
    pluralizer::pluralize(word, 1, false)
}

/// Foreign-key column referencing `name`.
///
/// `name` is a table name or an association alias; it is singularized and
/// suffixed with `Id`, then snake-cased when `underscored` is set.
#[must_use]
pub fn foreign_key(name: &str, underscored: bool) -> String {
    let key = format!("{}Id", singularize(name));
    if underscored { key.to_snake_case() } else { key }
}

/// Accessor method name such as `getProfile` for `("get", "profile")`.
#[must_use]
pub fn accessor_method(verb: &str, accessor: &str) -> String {
    format!("{verb}_{accessor}").to_lower_camel_case()
}
