use std::collections::HashSet;

use tracing::debug;

use super::LoaderManifest;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::version::version_file::{legacy_jvm_arguments, ArgumentValue, Arguments};
use crate::core::version::VersionMetadata;

/// Overlay `loader` on `base`.
///
/// Libraries are keyed by logical name (`group:artifact[:classifier]`); when
/// both sides declare one, only the loader's copy is kept. Loader libraries
/// come first on the resulting list, followed by the base libraries they do
/// not shadow, each group in its declared order.
pub fn merge(base: &VersionMetadata, loader: &LoaderManifest) -> LauncherResult<VersionMetadata> {
    if loader.mc_version != base.id {
        return Err(LauncherError::LoaderMismatch {
            loader: loader.describe(),
            expected: base.id.clone(),
            found: loader.mc_version.clone(),
        });
    }

    let shadowed: HashSet<String> = loader.libraries.iter().map(|l| l.logical_name()).collect();

    let mut merged = base.clone();
    merged.inherits_from = None;
    merged.libraries = loader.libraries.clone();
    for lib in &base.libraries {
        if shadowed.contains(&lib.logical_name()) {
            debug!("{} replaces base library {}", loader.describe(), lib.name);
            continue;
        }
        merged.libraries.push(lib.clone());
    }

    if let Some(main_class) = &loader.main_class_override {
        merged.main_class = Some(main_class.clone());
    }

    if let Some(args) = &loader.launch_args_override {
        if let Some(legacy) = &args.legacy {
            merged.minecraft_arguments = Some(legacy.clone());
        }

        match merged.arguments.as_mut() {
            Some(existing) => {
                existing.game.extend(args.game.iter().cloned());
                existing.jvm.extend(args.jvm.iter().cloned());
            }
            None if merged.minecraft_arguments.is_some() => {
                // Legacy base: game args live in one flat string.
                let extra = plain_tokens(&args.game);
                if let (Some(line), false) = (merged.minecraft_arguments.as_mut(), extra.is_empty()) {
                    line.push(' ');
                    line.push_str(&extra.join(" "));
                }
                if !args.jvm.is_empty() {
                    let mut jvm: Vec<ArgumentValue> = legacy_jvm_arguments()
                        .into_iter()
                        .map(ArgumentValue::Plain)
                        .collect();
                    jvm.extend(args.jvm.iter().cloned());
                    merged.arguments = Some(Arguments {
                        game: Vec::new(),
                        jvm,
                    });
                }
            }
            None => {
                merged.arguments = Some(Arguments {
                    game: args.game.clone(),
                    jvm: args.jvm.clone(),
                });
            }
        }
    }

    Ok(merged)
}

fn plain_tokens(values: &[ArgumentValue]) -> Vec<String> {
    values
        .iter()
        .filter_map(|v| match v {
            ArgumentValue::Plain(s) => Some(s.clone()),
            ArgumentValue::Conditional { .. } => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loaders::{LaunchArgs, LoaderType};
    use crate::core::version::{LibraryEntry, Platform};

    fn base() -> VersionMetadata {
        VersionMetadata::parse(
            r#"{
                "id": "1.20.1",
                "mainClass": "net.minecraft.client.main.Main",
                "assetIndex": {"id": "5", "url": "https://x/5.json"},
                "arguments": {"game": ["--username", "${auth_player_name}"], "jvm": ["-cp", "${classpath}"]},
                "libraries": [
                    {"name": "com.google.guava:guava:19.0"},
                    {"name": "org.lwjgl:lwjgl:3.3.1"},
                    {"name": "org.lwjgl:lwjgl:3.3.1:natives-linux"}
                ]
            }"#,
        )
        .unwrap()
    }

    fn loader(mc: &str, libraries: &[&str]) -> LoaderManifest {
        LoaderManifest {
            loader_type: LoaderType::Fabric,
            loader_version: "0.15.11".into(),
            mc_version: mc.into(),
            libraries: libraries
                .iter()
                .map(|n| LibraryEntry::from_coordinate(n, None))
                .collect(),
            main_class_override: Some("net.fabricmc.loader.impl.launch.knot.KnotClient".into()),
            launch_args_override: Some(LaunchArgs {
                game: vec![],
                jvm: vec![ArgumentValue::Plain("-DFabricMcEmu=Main".into())],
                legacy: None,
            }),
        }
    }

    #[test]
    fn loader_library_shadows_base_version() {
        let merged = merge(&base(), &loader("1.20.1", &["com.google.guava:guava:21.0"])).unwrap();
        let guava: Vec<_> = merged
            .libraries
            .iter()
            .filter(|l| l.logical_name() == "com.google.guava:guava")
            .collect();
        assert_eq!(guava.len(), 1);
        assert_eq!(guava[0].name, "com.google.guava:guava:21.0");
        // natives keep their own identity
        assert_eq!(merged.libraries.len(), 3);
    }

    #[test]
    fn main_class_and_arguments_are_overlaid() {
        let merged = merge(&base(), &loader("1.20.1", &[])).unwrap();
        assert_eq!(
            merged.main_class.as_deref(),
            Some("net.fabricmc.loader.impl.launch.knot.KnotClient")
        );
        let jvm = merged.jvm_arguments(&Platform::new("linux", "x86_64"));
        assert_eq!(jvm.last().map(String::as_str), Some("-DFabricMcEmu=Main"));
        assert_eq!(merged.asset_index_id(), Some("5"));
    }

    #[test]
    fn mismatched_minecraft_version_is_rejected() {
        let err = merge(&base(), &loader("1.21.1", &[])).unwrap_err();
        match err {
            LauncherError::LoaderMismatch { expected, found, .. } => {
                assert_eq!(expected, "1.20.1");
                assert_eq!(found, "1.21.1");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn legacy_base_receives_tweaker_tokens_inline() {
        let legacy = VersionMetadata::parse(
            r#"{"id": "1.12.2", "mainClass": "net.minecraft.client.main.Main",
                "minecraftArguments": "--username ${auth_player_name}"}"#,
        )
        .unwrap();
        let mut optifine = loader("1.12.2", &[]);
        optifine.launch_args_override = Some(LaunchArgs {
            game: vec![
                ArgumentValue::Plain("--tweakClass".into()),
                ArgumentValue::Plain("optifine.OptiFineTweaker".into()),
            ],
            jvm: vec![],
            legacy: None,
        });
        let merged = merge(&legacy, &optifine).unwrap();
        assert_eq!(
            merged.minecraft_arguments.as_deref(),
            Some("--username ${auth_player_name} --tweakClass optifine.OptiFineTweaker")
        );
    }
}
