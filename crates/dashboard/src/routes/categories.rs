//! Category management pages.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::instrument;

use bozor_core::models::Category;
use bozor_core::pagination::{Page, PageRequest};
use bozor_core::{CategoryId, catalog};

use crate::db::categories::{CategoryInput, CategoryRow, NAME_CONSTRAINT};
use crate::db::{CategoryRepository, RepositoryError};
use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::RequireStaff;
use crate::routes::{
    FormErrors, Layout, MessageQuery, Pagination, Section, checkbox, list_link, non_empty,
    with_message,
};
use crate::state::AppState;

const PER_PAGE: u32 = 12;
const MAX_NAME_LENGTH: usize = 120;

/// Category list query.
#[derive(Debug, Default, Deserialize)]
pub struct CategoryListQuery {
    pub page: Option<String>,
    #[serde(flatten)]
    pub messages: MessageQuery,
}

/// Create/update form data.
#[derive(Debug, Default, Deserialize)]
pub struct CategoryForm {
    #[serde(default)]
    pub name: String,
    /// Parent category ID; empty for a top-level category.
    pub parent: Option<String>,
    #[serde(default)]
    pub description: String,
    pub is_active: Option<String>,
}

/// Values shown in the category form.
#[derive(Debug, Clone)]
pub struct CategoryFields {
    pub name: String,
    pub parent: String,
    pub description: String,
    pub is_active: bool,
}

impl CategoryFields {
    /// Whether `id` is the selected parent.
    #[must_use]
    pub fn is_parent(&self, id: &CategoryId) -> bool {
        self.parent == id.to_string()
    }
}

impl Default for CategoryFields {
    fn default() -> Self {
        Self {
            name: String::new(),
            parent: String::new(),
            description: String::new(),
            is_active: true,
        }
    }
}

impl From<&Category> for CategoryFields {
    fn from(category: &Category) -> Self {
        Self {
            name: category.name.clone(),
            parent: category
                .parent_id
                .map(|id| id.to_string())
                .unwrap_or_default(),
            description: category.description.clone(),
            is_active: category.is_active,
        }
    }
}

impl From<CategoryForm> for CategoryFields {
    fn from(form: CategoryForm) -> Self {
        Self {
            is_active: checkbox(form.is_active.as_deref()),
            parent: form.parent.unwrap_or_default().trim().to_string(),
            name: form.name,
            description: form.description,
        }
    }
}

#[derive(Template, WebTemplate)]
#[template(path = "categories/list.html")]
pub struct CategoryListTemplate {
    pub layout: Layout,
    pub page: Page<CategoryRow>,
    pub pagination: Pagination,
}

#[derive(Template, WebTemplate)]
#[template(path = "categories/form.html")]
pub struct CategoryFormTemplate {
    pub layout: Layout,
    /// The category being edited; `None` when creating.
    pub category: Option<Category>,
    pub parents: Vec<Category>,
    pub fields: CategoryFields,
    pub errors: FormErrors,
}

#[derive(Template, WebTemplate)]
#[template(path = "categories/confirm_delete.html")]
pub struct CategoryDeleteTemplate {
    pub layout: Layout,
    pub category: Category,
}

/// Active categories that may become the parent of `editing`.
///
/// A category cannot sit below itself or one of its own descendants.
fn parent_choices(active: Vec<Category>, editing: Option<CategoryId>) -> Vec<Category> {
    let Some(id) = editing else {
        return active;
    };
    let excluded = catalog::descendants(&active, id, true);
    active
        .into_iter()
        .filter(|c| !excluded.contains(&c.id))
        .collect()
}

/// Validate the form against the allowed parents.
fn parse_category_form(
    fields: &CategoryFields,
    parents: &[Category],
) -> std::result::Result<CategoryInput, FormErrors> {
    let mut errors = FormErrors::default();

    let name = fields.name.trim();
    if name.is_empty() {
        errors.add("name", "This field is required.");
    } else if name.chars().count() > MAX_NAME_LENGTH {
        errors.add(
            "name",
            format!("Ensure this value has at most {MAX_NAME_LENGTH} characters."),
        );
    }

    let parent_id = match non_empty(Some(fields.parent.as_str())) {
        None => None,
        Some(raw) => {
            let id = raw.parse::<CategoryId>().ok();
            match id.filter(|id| parents.iter().any(|c| c.id == *id)) {
                Some(id) => Some(id),
                None => {
                    errors.add(
                        "parent",
                        "Select a valid choice. That choice is not one of the available choices.",
                    );
                    None
                }
            }
        }
    };

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(CategoryInput {
        name: name.to_owned(),
        parent_id,
        description: fields.description.trim().to_owned(),
        is_active: fields.is_active,
    })
}

fn conflict_errors(err: RepositoryError) -> std::result::Result<FormErrors, AppError> {
    let mut errors = FormErrors::default();
    match err {
        RepositoryError::Conflict(ref c) if c == NAME_CONSTRAINT => {
            errors.add("name", "Category with this Name already exists.");
        }
        other => return Err(other.into()),
    }
    Ok(errors)
}

async fn find_category(categories: &CategoryRepository<'_>, id: CategoryId) -> Result<Category> {
    categories
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("category {id}")))
}

/// Category list with parent names and product counts.
#[instrument(skip(staff, state))]
pub async fn index(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Query(query): Query<CategoryListQuery>,
) -> Result<CategoryListTemplate> {
    let categories = CategoryRepository::new(state.pool());

    let request = PageRequest::parse(query.page.as_deref(), PER_PAGE);
    let total = categories.count().await?;
    request.check(total)?;
    let page = request.page(categories.list(&request).await?, total);
    let pagination = Pagination::new(&page, |n| list_link("/categories", &[], n));

    Ok(CategoryListTemplate {
        layout: Layout::new(staff, Section::Categories, &query.messages),
        page,
        pagination,
    })
}

/// Empty create form.
#[instrument(skip(staff, state))]
pub async fn create_page(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
) -> Result<CategoryFormTemplate> {
    let parents = CategoryRepository::new(state.pool()).active().await?;

    Ok(CategoryFormTemplate {
        layout: Layout::plain(staff, Section::Categories),
        category: None,
        parents,
        fields: CategoryFields::default(),
        errors: FormErrors::default(),
    })
}

/// Create a category with a slug derived from its name.
#[instrument(skip(staff, state, form), fields(staff_id = %staff.id))]
pub async fn create(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Form(form): Form<CategoryForm>,
) -> Result<Response> {
    let categories = CategoryRepository::new(state.pool());
    let parents = categories.active().await?;
    let fields = CategoryFields::from(form);

    let errors = match parse_category_form(&fields, &parents) {
        Ok(input) => {
            let slug = categories.unique_slug(&input.name).await?;
            match categories.create(&input, &slug).await {
                Ok(category) => {
                    tracing::info!(category_id = %category.id, slug = %category.slug, "Category created");
                    let target =
                        with_message("/categories", "success", "category_created", &category.name);
                    return Ok(Redirect::to(&target).into_response());
                }
                Err(e) => conflict_errors(e)?,
            }
        }
        Err(errors) => errors,
    };

    Ok(CategoryFormTemplate {
        layout: Layout::plain(staff, Section::Categories),
        category: None,
        parents,
        fields,
        errors,
    }
    .into_response())
}

/// Edit form.
#[instrument(skip(staff, state))]
pub async fn update_page(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Path(id): Path<CategoryId>,
) -> Result<CategoryFormTemplate> {
    let categories = CategoryRepository::new(state.pool());
    let category = find_category(&categories, id).await?;
    let parents = parent_choices(categories.active().await?, Some(id));

    Ok(CategoryFormTemplate {
        layout: Layout::plain(staff, Section::Categories),
        fields: CategoryFields::from(&category),
        category: Some(category),
        parents,
        errors: FormErrors::default(),
    })
}

/// Save an edited category. The slug does not change.
#[instrument(skip(staff, state, form), fields(staff_id = %staff.id))]
pub async fn update(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Path(id): Path<CategoryId>,
    Form(form): Form<CategoryForm>,
) -> Result<Response> {
    let categories = CategoryRepository::new(state.pool());
    let category = find_category(&categories, id).await?;
    let parents = parent_choices(categories.active().await?, Some(id));
    let fields = CategoryFields::from(form);

    let errors = match parse_category_form(&fields, &parents) {
        Ok(input) => match categories.update(id, &input).await {
            Ok(updated) => {
                tracing::info!(category_id = %id, "Category updated");
                let target =
                    with_message("/categories", "success", "category_updated", &updated.name);
                return Ok(Redirect::to(&target).into_response());
            }
            Err(RepositoryError::NotFound) => {
                return Err(AppError::NotFound(format!("category {id}")));
            }
            Err(e) => conflict_errors(e)?,
        },
        Err(errors) => errors,
    };

    Ok(CategoryFormTemplate {
        layout: Layout::plain(staff, Section::Categories),
        category: Some(category),
        parents,
        fields,
        errors,
    }
    .into_response())
}

/// Delete confirmation.
#[instrument(skip(staff, state))]
pub async fn delete_page(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Path(id): Path<CategoryId>,
) -> Result<CategoryDeleteTemplate> {
    let category = find_category(&CategoryRepository::new(state.pool()), id).await?;

    Ok(CategoryDeleteTemplate {
        layout: Layout::plain(staff, Section::Categories),
        category,
    })
}

/// Delete a category unless products still reference it.
#[instrument(skip(staff, state), fields(staff_id = %staff.id))]
pub async fn delete(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Path(id): Path<CategoryId>,
) -> Result<Redirect> {
    let categories = CategoryRepository::new(state.pool());
    let category = find_category(&categories, id).await?;

    let (level, code) = match categories.delete(id).await {
        Ok(()) => {
            tracing::info!(category_id = %id, "Category deleted");
            ("success", "category_deleted")
        }
        Err(RepositoryError::Conflict(constraint)) => {
            tracing::info!(category_id = %id, %constraint, "Category delete refused");
            ("error", "category_in_use")
        }
        Err(RepositoryError::NotFound) => {
            return Err(AppError::NotFound(format!("category {id}")));
        }
        Err(e) => return Err(e.into()),
    };

    Ok(Redirect::to(&with_message(
        "/categories",
        level,
        code,
        &category.name,
    )))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn category(id: i32, name: &str, parent: Option<i32>) -> Category {
        Category {
            id: CategoryId::new(id),
            name: name.to_string(),
            slug: name.to_lowercase(),
            parent_id: parent.map(CategoryId::new),
            description: String::new(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn tree() -> Vec<Category> {
        vec![
            category(1, "Drinks", None),
            category(2, "Tea", Some(1)),
            category(3, "Green", Some(2)),
            category(4, "Sweets", None),
        ]
    }

    fn fields(name: &str, parent: &str) -> CategoryFields {
        CategoryFields {
            name: name.to_string(),
            parent: parent.to_string(),
            ..CategoryFields::default()
        }
    }

    #[test]
    fn test_parent_choices_exclude_self_and_descendants() {
        let ids: Vec<i32> = parent_choices(tree(), Some(CategoryId::new(2)))
            .iter()
            .map(|c| c.id.as_i32())
            .collect();
        assert_eq!(ids, vec![1, 4]);

        assert_eq!(parent_choices(tree(), None).len(), 4);
    }

    #[test]
    fn test_parse_category_form() {
        let parents = tree();
        let input = parse_category_form(&fields(" Herbal ", "2"), &parents)
            .unwrap_or_else(|_| panic!("form should be valid"));
        assert_eq!(input.name, "Herbal");
        assert_eq!(input.parent_id, Some(CategoryId::new(2)));

        let top = parse_category_form(&fields("Fruit", ""), &parents)
            .unwrap_or_else(|_| panic!("form should be valid"));
        assert_eq!(top.parent_id, None);
    }

    #[test]
    fn test_parse_category_form_rejects_unknown_parent() {
        let Err(errors) = parse_category_form(&fields("Fruit", "99"), &tree()) else {
            panic!("form should be invalid");
        };
        assert_eq!(errors.get("parent").len(), 1);

        let Err(errors) = parse_category_form(&fields("  ", "abc"), &tree()) else {
            panic!("form should be invalid");
        };
        assert_eq!(errors.get("name").len(), 1);
        assert_eq!(errors.get("parent").len(), 1);
    }

    #[test]
    fn test_is_parent() {
        assert!(fields("x", "3").is_parent(&CategoryId::new(3)));
        assert!(!fields("x", "").is_parent(&CategoryId::new(3)));
    }
}
