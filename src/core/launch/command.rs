// ─── Launch Command Builder ───
// Assembles the java command line for a resolved version.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::classpath::{build_classpath, classpath_separator, safe_path_str};
use crate::core::assets::game_assets_dir;
use crate::core::auth::Identity;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::instance::GameLayout;
use crate::core::resolver::ResolvedGraph;

const LAUNCHER_NAME: &str = "voxel-launcher";
const LAUNCHER_VERSION: &str = env!("CARGO_PKG_VERSION");
const SHELL_METACHARACTERS: &[char] = &[
    ';', '&', '|', '$', '`', '<', '>', '(', ')', '{', '}', '\\', '"', '\'', '*', '?', '!', '~',
    '#',
];

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GcPolicy {
    #[default]
    G1,
    Zgc,
    Parallel,
}

impl GcPolicy {
    pub fn flags(self) -> &'static [&'static str] {
        match self {
            GcPolicy::G1 => &[
                "-XX:+UnlockExperimentalVMOptions",
                "-XX:+UseG1GC",
                "-XX:G1NewSizePercent=20",
                "-XX:G1ReservePercent=20",
                "-XX:MaxGCPauseMillis=50",
                "-XX:G1HeapRegionSize=32M",
            ],
            GcPolicy::Zgc => &["-XX:+UseZGC"],
            GcPolicy::Parallel => &["-XX:+UseParallelGC"],
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemorySettings {
    pub min_mb: u32,
    pub max_mb: u32,
}

impl MemorySettings {
    pub fn validate(self) -> LauncherResult<Self> {
        if self.min_mb == 0 || self.max_mb == 0 || self.min_mb > self.max_mb {
            return Err(LauncherError::InvalidArgument(format!(
                "memory range {}..{} MB is invalid",
                self.min_mb, self.max_mb
            )));
        }
        Ok(self)
    }
}

/// Everything a single launch needs besides the graph. Built per call.
#[derive(Debug, Clone)]
pub struct LaunchContext {
    pub version_id: String,
    pub identity: Identity,
    pub memory: MemorySettings,
    pub gc: GcPolicy,
    pub extra_jvm_args: Vec<String>,
    pub java: PathBuf,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LaunchCommand {
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

/// Split a user-supplied flag string into tokens and validate them.
pub fn parse_extra_args(raw: &str) -> LauncherResult<Vec<String>> {
    let tokens: Vec<String> = raw.split_whitespace().map(str::to_owned).collect();
    validate_extra_args(&tokens)?;
    Ok(tokens)
}

/// Each extra flag must be a single JVM option token.
pub fn validate_extra_args(args: &[String]) -> LauncherResult<()> {
    for arg in args {
        let bad = arg.is_empty()
            || !arg.starts_with('-')
            || arg.chars().any(|c| c.is_whitespace() || c.is_control())
            || arg.contains(SHELL_METACHARACTERS);
        if bad {
            return Err(LauncherError::InvalidArgument(format!(
                "JVM flag '{}' is not allowed",
                arg
            )));
        }
    }
    Ok(())
}

pub fn build(
    graph: &ResolvedGraph,
    ctx: &LaunchContext,
    layout: &GameLayout,
) -> LauncherResult<LaunchCommand> {
    let memory = ctx.memory.validate()?;
    validate_extra_args(&ctx.extra_jvm_args)?;
    let credentials = ctx.identity.credentials()?;

    let game_dir = layout.game_dir(&ctx.version_id);
    let assets_dir = layout.assets_dir();
    let classpath = build_classpath(graph, &layout.version_jar(&ctx.version_id))?;

    let game_assets = game_assets_dir(&graph.asset_index.id, &assets_dir, &game_dir);

    let vars: HashMap<&str, String> = HashMap::from([
        ("auth_player_name", credentials.username.clone()),
        ("auth_uuid", credentials.uuid.clone()),
        ("auth_access_token", credentials.access_token.clone()),
        ("auth_session", credentials.access_token.clone()),
        ("auth_xuid", credentials.xuid.clone()),
        ("user_type", credentials.user_type.to_string()),
        ("user_properties", "{}".to_string()),
        ("clientid", String::new()),
        ("version_name", ctx.version_id.clone()),
        (
            "version_type",
            graph.version_type.clone().unwrap_or_else(|| "release".into()),
        ),
        ("game_directory", safe_path_str(&game_dir)),
        ("assets_root", safe_path_str(&assets_dir)),
        ("game_assets", safe_path_str(&game_assets)),
        ("assets_index_name", graph.asset_index.id.clone()),
        ("natives_directory", safe_path_str(&layout.natives_dir(&ctx.version_id))),
        ("library_directory", safe_path_str(&layout.libraries_dir())),
        ("classpath_separator", classpath_separator().to_string()),
        ("classpath", classpath),
        ("launcher_name", LAUNCHER_NAME.to_string()),
        ("launcher_version", LAUNCHER_VERSION.to_string()),
    ]);

    let mut args = vec![
        format!("-Xms{}M", memory.min_mb),
        format!("-Xmx{}M", memory.max_mb),
    ];
    args.extend(ctx.gc.flags().iter().map(|f| f.to_string()));
    args.push("-Dlog4j2.formatMsgNoLookups=true".into());

    for arg in &graph.jvm_arguments {
        args.push(substitute(arg, &vars)?);
    }
    args.extend(ctx.extra_jvm_args.iter().cloned());
    args.push(graph.main_class.clone());
    for arg in &graph.game_arguments {
        args.push(substitute(arg, &vars)?);
    }

    debug!("Built launch command with {} arguments", args.len());
    Ok(LaunchCommand {
        executable: ctx.java.clone(),
        args,
        working_dir: game_dir,
    })
}

/// Replace every `${name}` in `arg`. An unknown name is an error.
fn substitute(arg: &str, vars: &HashMap<&str, String>) -> LauncherResult<String> {
    let mut out = String::with_capacity(arg.len());
    let mut rest = arg;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(LauncherError::UnresolvedPlaceholder {
                placeholder: rest[start..].to_string(),
                argument: arg.to_string(),
            });
        };
        let key = &after[..end];
        match vars.get(key) {
            Some(value) => out.push_str(value),
            None => {
                return Err(LauncherError::UnresolvedPlaceholder {
                    placeholder: format!("${{{}}}", key),
                    argument: arg.to_string(),
                })
            }
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Working directory for `version_id`, created if needed.
pub async fn prepare_working_dir(layout: &GameLayout, version_id: &str) -> LauncherResult<PathBuf> {
    let dir = layout.game_dir(version_id);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| LauncherError::io(&dir, e))?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resolver::ResolvedArtifact;
    use crate::core::version::version_file::AssetIndexInfo;

    fn graph() -> ResolvedGraph {
        ResolvedGraph {
            version_id: "1.21.1".into(),
            version_type: Some("release".into()),
            main_class: "net.minecraft.client.main.Main".into(),
            asset_index: AssetIndexInfo {
                id: "17".into(),
                url: "https://x/17.json".into(),
                sha1: None,
                size: None,
                total_size: None,
            },
            client: None,
            libraries: vec![ResolvedArtifact {
                name: "com.mojang:brigadier:1.3.10".into(),
                url: None,
                path: PathBuf::from("/mc/libraries/brigadier.jar"),
                sha1: None,
                size: None,
            }],
            natives: vec![],
            game_arguments: [
                "--username",
                "${auth_player_name}",
                "--uuid",
                "${auth_uuid}",
                "--accessToken",
                "${auth_access_token}",
                "--version",
                "${version_name}",
                "--assetIndex",
                "${assets_index_name}",
                "--gameDir",
                "${game_directory}",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            jvm_arguments: vec![
                "-Djava.library.path=${natives_directory}".into(),
                "-cp".into(),
                "${classpath}".into(),
            ],
            java_major: Some(21),
        }
    }

    fn ctx(gc: GcPolicy, extra: &[&str]) -> LaunchContext {
        LaunchContext {
            version_id: "1.21.1".into(),
            identity: Identity::offline("Steve"),
            memory: MemorySettings {
                min_mb: 1024,
                max_mb: 4096,
            },
            gc,
            extra_jvm_args: extra.iter().map(|s| s.to_string()).collect(),
            java: PathBuf::from("java"),
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> &'a str {
        let idx = args.iter().position(|a| a == flag).unwrap();
        &args[idx + 1]
    }

    #[test]
    fn offline_build_is_deterministic() {
        let layout = GameLayout::new("/mc");
        let a = build(&graph(), &ctx(GcPolicy::G1, &[]), &layout).unwrap();
        let b = build(&graph(), &ctx(GcPolicy::G1, &[]), &layout).unwrap();
        assert_eq!(a, b);
        assert_eq!(value_after(&a.args, "--uuid"), "5627dd98e6be3c21b8a8e92344183641");
        assert_eq!(value_after(&a.args, "--accessToken"), "");
        assert_eq!(value_after(&a.args, "--assetIndex"), "17");
        assert_eq!(a.working_dir, PathBuf::from("/mc/versions/1.21.1"));
    }

    #[test]
    fn memory_gc_and_classpath_are_placed_before_main_class() {
        let layout = GameLayout::new("/mc");
        let cmd = build(&graph(), &ctx(GcPolicy::Zgc, &["-XX:+AlwaysPreTouch"]), &layout).unwrap();
        let main = cmd
            .args
            .iter()
            .position(|a| a == "net.minecraft.client.main.Main")
            .unwrap();

        assert_eq!(cmd.args[0], "-Xms1024M");
        assert_eq!(cmd.args[1], "-Xmx4096M");
        assert!(cmd.args[..main].contains(&"-XX:+UseZGC".to_string()));
        assert!(!cmd.args.contains(&"-XX:+UseG1GC".to_string()));
        assert_eq!(cmd.args[main - 1], "-XX:+AlwaysPreTouch");
        let cp = value_after(&cmd.args, "-cp");
        assert!(cp.starts_with("/mc/libraries/brigadier.jar"));
        assert!(cp.ends_with("/mc/versions/1.21.1/1.21.1.jar"));
    }

    #[test]
    fn unresolved_placeholder_is_fatal() {
        let mut g = graph();
        g.game_arguments.push("${mystery_value}".into());
        let err = build(&g, &ctx(GcPolicy::G1, &[]), &GameLayout::new("/mc")).unwrap_err();
        assert!(matches!(
            err,
            LauncherError::UnresolvedPlaceholder { placeholder, .. } if placeholder == "${mystery_value}"
        ));
    }

    #[test]
    fn extra_flags_reject_shell_syntax() {
        assert!(parse_extra_args("-Xss2M  -Dfoo=bar").is_ok());
        for bad in ["-Dx=$(rm -rf /)", "-Da=b;c", "notaflag", "-Dq=`id`", "-Dp=a|b"] {
            assert!(validate_extra_args(&[bad.to_string()]).is_err(), "{bad}");
        }
        let err = build(&graph(), &ctx(GcPolicy::G1, &["-Da=1&&b"]), &GameLayout::new("/mc"));
        assert!(matches!(err, Err(LauncherError::InvalidArgument(_))));
    }

    #[test]
    fn gc_table() {
        assert!(GcPolicy::G1.flags().contains(&"-XX:MaxGCPauseMillis=50"));
        assert!(GcPolicy::G1.flags().contains(&"-XX:G1HeapRegionSize=32M"));
        assert_eq!(GcPolicy::Parallel.flags(), &["-XX:+UseParallelGC"]);
        assert_eq!(
            serde_json::from_str::<GcPolicy>("\"zgc\"").unwrap(),
            GcPolicy::Zgc
        );
    }

    #[test]
    fn game_assets_follows_legacy_index_layout() {
        let layout = GameLayout::new("/mc");
        let mut g = graph();
        g.game_arguments = vec!["--assetsDir".into(), "${game_assets}".into()];

        g.asset_index.id = "pre-1.6".into();
        let cmd = build(&g, &ctx(GcPolicy::G1, &[]), &layout).unwrap();
        assert_eq!(value_after(&cmd.args, "--assetsDir"), "/mc/versions/1.21.1/resources");

        g.asset_index.id = "legacy".into();
        let cmd = build(&g, &ctx(GcPolicy::G1, &[]), &layout).unwrap();
        assert_eq!(value_after(&cmd.args, "--assetsDir"), "/mc/assets/virtual/legacy");
    }

    #[test]
    fn invalid_memory_range_is_rejected() {
        let mut c = ctx(GcPolicy::G1, &[]);
        c.memory = MemorySettings {
            min_mb: 8192,
            max_mb: 1024,
        };
        assert!(build(&graph(), &c, &GameLayout::new("/mc")).is_err());
    }
}
