use std::collections::HashMap;

use anyhow::{Context, Result, bail};
use tabled::{Table, Tabled, settings::Style};

use crate::notify::Notifier;
use crate::spoonacular::SpoonacularClient;
use larder_core::grocery::{AdHocItem, GroceryList, ItemKey, ItemState, ListLine, build_list};
use larder_core::models::{CanonicalIngredient, Channel};
use larder_core::service::LarderService;

use super::helpers::{amount, parse_ingredient_arg, parse_note_arg, truncate};
use super::require_user;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GrocerySource {
    Recipe(i64),
    Saved(i64),
    External(i64),
}

impl GrocerySource {
    pub(crate) fn from_flags(id: i64, saved: bool, external: bool) -> Self {
        if saved {
            Self::Saved(id)
        } else if external {
            Self::External(id)
        } else {
            Self::Recipe(id)
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct GroceryOptions {
    pub check: Vec<String>,
    pub cross: Vec<String>,
    pub note: Vec<String>,
    pub add: Vec<String>,
    pub email: bool,
    pub sms: bool,
    pub json: bool,
}

impl GroceryOptions {
    fn channel(&self) -> Option<Channel> {
        if self.email {
            Some(Channel::Email)
        } else if self.sms {
            Some(Channel::Sms)
        } else {
            None
        }
    }
}

/// Item state from `--check`, `--cross`, and `--note` flags.
fn session_from_options(options: &GroceryOptions) -> Result<HashMap<ItemKey, ItemState>> {
    let mut session: HashMap<ItemKey, ItemState> = HashMap::new();
    for key in &options.check {
        session.entry(key.parse()?).or_default().checked = true;
    }
    for key in &options.cross {
        session.entry(key.parse()?).or_default().crossed = true;
    }
    for raw in &options.note {
        let (key, note) = parse_note_arg(raw)?;
        session.entry(key.parse()?).or_default().note = note.to_string();
    }
    Ok(session)
}

fn ad_hoc_from_options(options: &GroceryOptions) -> Result<Vec<AdHocItem>> {
    options
        .add
        .iter()
        .map(|raw| {
            let ing = parse_ingredient_arg(raw)?;
            Ok(AdHocItem {
                ingredient: ing.ingredient,
                quantity: ing.quantity,
                unit: ing.unit,
                note: String::new(),
            })
        })
        .collect()
}

async fn load_base(
    service: &LarderService,
    recipes: &SpoonacularClient,
    user: Option<i64>,
    source: GrocerySource,
) -> Result<(String, Vec<CanonicalIngredient>)> {
    match source {
        GrocerySource::Recipe(id) => Ok(service.recipe_grocery_base(require_user(user)?, id)?),
        GrocerySource::Saved(id) => {
            let saved = service.get_saved(require_user(user)?, id)?;
            Ok(recipes.saved_ingredients_async(&saved).await?)
        }
        GrocerySource::External(id) => Ok(recipes.ingredients_async(id).await?),
    }
}

pub(crate) async fn cmd_grocery(
    service: &LarderService,
    recipes: &SpoonacularClient,
    notifier: Option<&Notifier>,
    user: Option<i64>,
    source: GrocerySource,
    options: GroceryOptions,
) -> Result<()> {
    let session = session_from_options(&options)?;
    let ad_hoc = ad_hoc_from_options(&options)?;
    let (title, base) = load_base(service, recipes, user, source).await?;
    let list = build_list(&base, &session, &ad_hoc);

    if let Some(channel) = options.channel() {
        let notifier = notifier.context("No notifier configured")?;
        let lines: Vec<ListLine> = list.needed.iter().map(ListLine::from).collect();
        let Some(delivery) =
            service.prepare_grocery_delivery(require_user(user)?, Some(&title), &lines, channel)?
        else {
            bail!("Nothing to send: every item is checked or crossed off");
        };
        notifier.deliver(&delivery).await?;
        if options.json {
            println!("{}", serde_json::json!({ "success": true, "to": delivery.to }));
        } else {
            println!(
                "Sent {} item(s) from {title} to {}",
                lines.len(),
                delivery.to
            );
        }
        return Ok(());
    }

    if options.json {
        println!("{}", serde_json::to_string_pretty(&list)?);
    } else {
        println!("Grocery list: {title}");
        print_list(&list);
    }
    Ok(())
}

fn print_list(list: &GroceryList) {
    #[derive(Tabled)]
    struct ItemRow {
        #[tabled(rename = "Key")]
        key: String,
        #[tabled(rename = "Item")]
        item: String,
        #[tabled(rename = "Amount")]
        amount: String,
        #[tabled(rename = "Note")]
        note: String,
        #[tabled(rename = "Status")]
        status: &'static str,
    }

    let rows: Vec<ItemRow> = list
        .all
        .iter()
        .map(|i| ItemRow {
            key: i.key.to_string(),
            item: truncate(&i.ingredient, 40),
            amount: amount(&i.quantity, &i.unit),
            note: truncate(&i.note, 30),
            status: if i.crossed {
                "crossed"
            } else if i.checked {
                "have"
            } else {
                "need"
            },
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
    println!("{} of {} item(s) still needed", list.needed.len(), list.all.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_from_options() {
        let options = GroceryOptions {
            check: vec!["4".to_string()],
            cross: vec!["c1".to_string()],
            note: vec!["4=the good one".to_string(), "7=two bags".to_string()],
            ..GroceryOptions::default()
        };
        let session = session_from_options(&options).unwrap();
        assert_eq!(session.len(), 3);

        let four = &session[&ItemKey::Ingredient(4)];
        assert!(four.checked);
        assert_eq!(four.note, "the good one");
        assert!(session[&ItemKey::Custom(1)].crossed);
        assert!(!session[&ItemKey::Ingredient(7)].checked);
    }

    #[test]
    fn test_session_rejects_bad_keys() {
        let options = GroceryOptions {
            check: vec!["flour".to_string()],
            ..GroceryOptions::default()
        };
        assert!(session_from_options(&options).is_err());
    }

    #[test]
    fn test_source_from_flags() {
        assert_eq!(GrocerySource::from_flags(3, false, false), GrocerySource::Recipe(3));
        assert_eq!(GrocerySource::from_flags(3, true, false), GrocerySource::Saved(3));
        assert_eq!(
            GrocerySource::from_flags(3, false, true),
            GrocerySource::External(3)
        );
    }

    #[tokio::test]
    async fn test_grocery_send_with_nothing_needed_fails() {
        let service = LarderService::new_in_memory().unwrap();
        let signup = service
            .sign_up(&larder_core::models::NewUser {
                name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                phone: None,
            })
            .unwrap();
        service
            .verify_user(signup.user.id, &signup.verification_code)
            .unwrap();
        let detail = service
            .create_recipe(&larder_core::models::NewRecipe {
                user_id: signup.user.id,
                title: "Toast".to_string(),
                description: String::new(),
                servings: 1,
                notes: None,
                image: None,
                ingredients: vec![larder_core::models::IngredientInput::new("Bread", "2", "slices")],
                steps: vec!["Toast it".to_string()],
            })
            .unwrap();

        let notifier = Notifier::new(
            std::sync::Arc::new(crate::notify::LogOnlyNotifier),
            std::sync::Arc::new(crate::notify::LogOnlyNotifier),
        );
        let recipes = SpoonacularClient::new(None).unwrap();
        let options = GroceryOptions {
            check: vec![detail.ingredients[0].id.to_string()],
            email: true,
            ..GroceryOptions::default()
        };
        let err = cmd_grocery(
            &service,
            &recipes,
            Some(&notifier),
            Some(signup.user.id),
            GrocerySource::Recipe(detail.recipe.id),
            options,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("Nothing to send"));
    }
}
