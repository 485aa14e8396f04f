//! Built-in crew presets, embedded at compile time

const PRESETS: &[(&str, &str)] = &[
    ("github", include_str!("presets/github.toml")),
    ("context7", include_str!("presets/context7.toml")),
    ("combined", include_str!("presets/combined.toml")),
];

/// TOML source of a preset
pub fn get(name: &str) -> Option<&'static str> {
    PRESETS.iter().find(|(n, _)| *n == name).map(|(_, src)| *src)
}

/// Preset names in declaration order
pub fn names() -> impl Iterator<Item = &'static str> {
    PRESETS.iter().map(|(n, _)| *n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::CrewDefinition;

    #[test]
    fn test_all_presets_parse_and_validate() {
        for name in names() {
            let def = CrewDefinition::from_toml(get(name).unwrap())
                .unwrap_or_else(|e| panic!("preset {} is invalid: {}", name, e));
            assert_eq!(def.name, name);
        }
    }

    #[test]
    fn test_combined_preset_shape() {
        let def = CrewDefinition::from_toml(get("combined").unwrap()).unwrap();
        let providers: Vec<_> = def.providers.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(providers, vec!["sequential-thinking", "github"]);
        assert_eq!(def.agents.len(), 2);
        assert_eq!(def.tasks.len(), 3);
        assert_eq!(def.tasks[1].context.as_deref(), Some(&["plan".to_string()][..]));
        assert_eq!(def.required_env, vec!["GITHUB_PERSONAL_ACCESS_TOKEN"]);
    }

    #[test]
    fn test_context7_preset_has_direct_call_and_params() {
        let def = CrewDefinition::from_toml(get("context7").unwrap()).unwrap();
        assert!(def.required_env.is_empty());
        assert_eq!(def.tool_calls[0].tool, "resolve-library-id");
        assert_eq!(def.tool_calls[0].arguments["libraryName"], "crewai");
        assert_eq!(def.tasks[0].params["tokens"], 2000);
    }

    #[test]
    fn test_unknown_preset() {
        assert!(get("nope").is_none());
    }
}
