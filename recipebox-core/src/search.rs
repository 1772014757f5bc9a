//! In-memory recipe search.

use std::slice;

use crate::model::Recipe;

/// Recipe fields a search term is matched against. `dietary` is not searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    Name,
    Time,
    Cost,
    Filter,
    Appliances,
    Ingredients,
    Recipe,
}

impl SearchField {
    pub const ALL: [SearchField; 7] = [
        SearchField::Name,
        SearchField::Time,
        SearchField::Cost,
        SearchField::Filter,
        SearchField::Appliances,
        SearchField::Ingredients,
        SearchField::Recipe,
    ];

    /// The field's values; scalar fields yield one.
    pub fn values(self, recipe: &Recipe) -> &[String] {
        match self {
            SearchField::Name => slice::from_ref(&recipe.name),
            SearchField::Time => slice::from_ref(&recipe.time),
            SearchField::Cost => slice::from_ref(&recipe.cost),
            SearchField::Filter => &recipe.filter,
            SearchField::Appliances => &recipe.appliances,
            SearchField::Ingredients => &recipe.ingredients,
            SearchField::Recipe => slice::from_ref(&recipe.recipe),
        }
    }
}

/// `needle` must already be lowercase.
fn matches(recipe: &Recipe, needle: &str) -> bool {
    SearchField::ALL.iter().any(|field| {
        field
            .values(recipe)
            .iter()
            .any(|value| value.to_lowercase().contains(needle))
    })
}

/// Records whose searchable fields contain `term`, case-insensitively, in
/// their original order. A blank term returns everything; otherwise the
/// term is matched as typed, surrounding whitespace included.
pub fn apply_filter<R: AsRef<Recipe> + Clone>(term: &str, records: &[R]) -> Vec<R> {
    if term.trim().is_empty() {
        return records.to_vec();
    }
    let needle = term.to_lowercase();
    records
        .iter()
        .filter(|record| matches(record.as_ref(), &needle))
        .cloned()
        .collect()
}
