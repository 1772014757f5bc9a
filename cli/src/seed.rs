use anyhow::{Context, Result};
use recipebox_core::methods::RECIPES_INSERT;
use recipebox_core::MethodCaller;
use serde_json::{json, Value};

use crate::client::Client;

struct SeedRecipe {
    name: &'static str,
    image: &'static str,
    time: &'static str,
    cost: &'static str,
    appliances: &'static [&'static str],
    ingredients: &'static [&'static str],
    recipe: &'static str,
    dietary: &'static [&'static str],
}

const SAMPLE_RECIPES: &[SeedRecipe] = &[
    SeedRecipe {
        name: "Pasta",
        image: "https://images.example.com/recipes/pasta.jpg",
        time: "25 min",
        cost: "$6",
        appliances: &["Stove"],
        ingredients: &["spaghetti", "tomato", "garlic", "olive oil", "basil"],
        recipe: "1. Boil the spaghetti in salted water until al dente.
2. Warm olive oil and garlic, add chopped tomato and simmer for 10 minutes.
3. Toss the pasta with the sauce and tear basil over the top.",
        dietary: &["Vegan", "Dairy-Free"],
    },
    SeedRecipe {
        name: "Salad",
        image: "https://images.example.com/recipes/salad.jpg",
        time: "10 min",
        cost: "$4",
        appliances: &[],
        ingredients: &["lettuce", "tomato", "cucumber", "lemon juice"],
        recipe: "1. Chop the vegetables.
2. Dress with lemon juice and a pinch of salt just before serving.",
        dietary: &["Vegan", "Gluten-Free", "Dairy-Free"],
    },
    SeedRecipe {
        name: "Chicken Fried Rice",
        image: "https://images.example.com/recipes/fried-rice.jpg",
        time: "20 min",
        cost: "$5",
        appliances: &["Rice Cooker", "Stove"],
        ingredients: &["cooked rice", "chicken thigh", "egg", "soy sauce", "green onion"],
        recipe: "1. Stir-fry diced chicken until cooked through and set aside.
2. Scramble the egg, add day-old rice and soy sauce.
3. Return the chicken, toss with green onion and serve.",
        dietary: &["Dairy-Free"],
    },
    SeedRecipe {
        name: "Microwave Mug Omelette",
        image: "https://images.example.com/recipes/mug-omelette.jpg",
        time: "5 min",
        cost: "$2",
        appliances: &["Microwave"],
        ingredients: &["egg", "milk", "cheddar", "spinach"],
        recipe: "1. Whisk eggs and milk in a mug.
2. Stir in cheese and spinach.
3. Microwave for 90 seconds, stirring halfway.",
        dietary: &["Vegetarian", "Gluten-Free"],
    },
    SeedRecipe {
        name: "Overnight Oats",
        image: "https://images.example.com/recipes/oats.jpg",
        time: "5 min + overnight",
        cost: "$2",
        appliances: &[],
        ingredients: &["rolled oats", "oat milk", "chia seeds", "banana"],
        recipe: "1. Combine oats, milk and chia seeds in a jar.
2. Refrigerate overnight and top with sliced banana.",
        dietary: &["Vegan", "Dairy-Free"],
    },
];

impl SeedRecipe {
    fn to_document(&self) -> Value {
        let mut document = json!({
            "name": self.name,
            "image": self.image,
            "time": self.time,
            "cost": self.cost,
            "ingredients": self.ingredients,
            "recipe": self.recipe,
        });
        if !self.appliances.is_empty() {
            document["appliances"] = json!(self.appliances);
        }
        if !self.dietary.is_empty() {
            document["dietary"] = json!(self.dietary);
        }
        document
    }
}

/// Sign up (or log in) the seed user and insert the sample recipes.
pub async fn seed(client: &Client, username: &str, password: &str) -> Result<()> {
    let token = match client.signup(username, password).await {
        Ok(token) => {
            println!("Created user {}", username);
            token
        }
        Err(_) => {
            let token = client
                .login(username, password)
                .await
                .context("Failed to sign up or log in the seed user")?;
            println!("Logged in as existing user {}", username);
            token
        }
    };
    let client = client.with_token(token);

    for sample in SAMPLE_RECIPES {
        client
            .call(RECIPES_INSERT, sample.to_document())
            .await
            .with_context(|| format!("Failed to insert {}", sample.name))?;
        println!("  Added {}", sample.name);
    }

    println!("Seeded {} recipes", SAMPLE_RECIPES.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use recipebox_core::{Document, Recipe};

    #[test]
    fn test_sample_recipes_are_valid() {
        for sample in SAMPLE_RECIPES {
            let document = sample.to_document();
            assert!(
                Recipe::schema().validate(&document).is_ok(),
                "{} does not validate",
                sample.name
            );
        }
    }
}
