//! Client-side scene edits that live only until the next remote refresh.

use std::collections::BTreeSet;

use crate::model::{Budget, Scene, SceneBudget};

const BASE_SCENE_COST: f64 = 1500.0;
const POSITION_STEP: f64 = 100.0;
const PER_CHARACTER: f64 = 300.0;
const PER_PROP: f64 = 50.0;

fn location_cost(location: &str) -> f64 {
    match location {
        "Beach" => 700.0,
        "Street" => 300.0,
        _ => 400.0,
    }
}

/// Rough local budget used while scenes are edited offline.
///
/// Unlike backend budgets, `total` is always the sum of `per_scene`.
pub fn estimate_local_budget(scenes: &[Scene]) -> Budget {
    let per_scene: Vec<SceneBudget> = scenes
        .iter()
        .enumerate()
        .map(|(pos, scene)| SceneBudget {
            scene: scene.scene_label.clone(),
            total: BASE_SCENE_COST
                + POSITION_STEP * pos as f64
                + PER_CHARACTER * scene.characters.len() as f64
                + PER_PROP * scene.props.len() as f64
                + location_cost(&scene.location),
        })
        .collect();
    Budget {
        total: per_scene.iter().map(|s| s.total).sum(),
        per_scene,
    }
}

/// Split a comma separated character list, dropping blanks.
pub fn parse_character_list(csv: &str) -> BTreeSet<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

impl Scene {
    /// A scene built in the dashboard before the backend knows about it.
    pub fn local(label: &str, location: &str, index: u64) -> Self {
        let location = location.trim();
        Self {
            id: format!("local-{index}"),
            index,
            scene_label: label.trim().to_string(),
            location: if location.is_empty() {
                "Unknown".to_string()
            } else {
                location.to_string()
            },
            scene_type: None,
            time: Some("Day".to_string()),
            summary: None,
            word_count: 0,
            predicted_budget: 0.0,
            suggested_location: None,
            progress_status: "todo".to_string(),
            characters: BTreeSet::new(),
            props: BTreeSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn estimate_follows_position_cast_and_location() {
        let mut beach = Scene::local("Sunset", "Beach", 1);
        beach.characters = parse_character_list("MAYA, JONAH");
        beach.props.insert("Surfboard".to_string());
        let street = Scene::local("Chase", "Street", 2);
        let office = Scene::local("Briefing", "", 3);

        let budget = estimate_local_budget(&[beach, street, office]);
        let totals: Vec<f64> = budget.per_scene.iter().map(|s| s.total).collect();
        assert_eq!(totals, vec![1500.0 + 600.0 + 50.0 + 700.0, 1600.0 + 300.0, 1700.0 + 400.0]);
        assert_eq!(budget.total, totals.iter().sum::<f64>());
        assert_eq!(budget.per_scene[2].scene, "Briefing");
    }

    #[test]
    fn local_scene_defaults() {
        let scene = Scene::local(" Night Market ", "  ", 4);
        assert_eq!(scene.scene_label, "Night Market");
        assert_eq!(scene.location, "Unknown");
        assert_eq!(scene.time.as_deref(), Some("Day"));
        assert_eq!(scene.id, "local-4");
    }

    #[test]
    fn character_list_is_a_set() {
        assert_eq!(
            parse_character_list("B, A,, B ,"),
            BTreeSet::from(["A".to_string(), "B".to_string()])
        );
    }
}
