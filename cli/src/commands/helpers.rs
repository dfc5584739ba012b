use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use larder_core::models::{Ingredient, Recipe, Toast};
use larder_core::toast::Toaster;

use crate::shell::render_toasts;

/// Quantities are whole numbers in practice; drop the fraction when there is none.
pub(crate) fn format_quantity(q: f64) -> String {
    if q.fract() == 0.0 {
        format!("{q:.0}")
    } else {
        format!("{q:.2}")
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    }
}

pub(crate) fn print_ingredient_table(ingredients: &[Ingredient]) {
    #[derive(Tabled)]
    struct IngredientRow {
        #[tabled(rename = "#")]
        idx: usize,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Qty")]
        quantity: String,
        #[tabled(rename = "Unit")]
        unit: String,
        #[tabled(rename = "Category")]
        category: String,
        #[tabled(rename = "ID")]
        id: String,
    }

    let rows: Vec<IngredientRow> = ingredients
        .iter()
        .enumerate()
        .map(|(i, ing)| IngredientRow {
            idx: i + 1,
            name: truncate(&ing.name, 30),
            quantity: format_quantity(ing.quantity),
            unit: ing.unit.clone(),
            category: ing.category.clone().unwrap_or_default(),
            id: ing.id.clone(),
        })
        .collect();

    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..3)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_recipe_table(recipes: &[Recipe]) {
    #[derive(Tabled)]
    struct RecipeRow {
        #[tabled(rename = "Title")]
        title: String,
        #[tabled(rename = "File")]
        file: String,
        #[tabled(rename = "Type")]
        file_type: String,
        #[tabled(rename = "Created")]
        created: String,
    }

    let rows: Vec<RecipeRow> = recipes
        .iter()
        .map(|r| RecipeRow {
            title: truncate(&r.title, 40),
            file: r.file_path.clone().unwrap_or_default(),
            file_type: r.file_type.clone().unwrap_or_default(),
            created: r
                .created_at
                .as_deref()
                .map(|c| c.chars().take(16).collect())
                .unwrap_or_default(),
        })
        .collect();

    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{table}");
}

/// Flush queued notifications to stderr. Returns true if any was an error.
///
/// In JSON mode the error toasts are printed as `{"error": ...}` lines so
/// scripts still get machine-readable output.
pub(crate) fn report_toasts(toaster: &Toaster, json: bool) -> bool {
    let toasts = toaster.drain();
    let failed = toasts.iter().any(Toast::is_error);
    if json {
        for t in toasts.iter().filter(|t| t.is_error()) {
            eprintln!("{}", json_error(&toast_message(t)));
        }
    } else {
        eprint!("{}", render_toasts(&toasts));
    }
    failed
}

fn toast_message(toast: &Toast) -> String {
    if toast.description.is_empty() {
        toast.title.clone()
    } else {
        format!("{}: {}", toast.title, toast.description)
    }
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else if max < 4 {
        s.chars().take(max).collect()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
