use std::fmt;

use serde::Serialize;

use crate::core::{ActionKind, Recommendation, ResourceType, ZombieResource};

pub const DEFAULT_CLI: &str = "gcloud compute";

const RESIZE_MARKER: &str = "Change machine type";
const DELETE_MARKER: &str = "Delete";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Resize,
    Delete,
    Unknown,
}

impl Intent {
    pub const fn as_str(self) -> &'static str {
        match self {
            Intent::Resize => "resize",
            Intent::Delete => "delete",
            Intent::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ActionKind> for Intent {
    fn from(kind: ActionKind) -> Self {
        match kind {
            ActionKind::Resize => Intent::Resize,
            ActionKind::Delete => Intent::Delete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Structured,
    Heuristic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum SynthesisIssue {
    #[serde(rename = "PARSE_AMBIGUITY")]
    ParseAmbiguity,
    #[serde(rename = "MISSING_MACHINE_TYPE")]
    MissingMachineType,
    #[serde(rename = "MISSING_ZONE")]
    MissingZone,
    #[serde(rename = "UNSAFE_ARGUMENT")]
    UnsafeArgument { value: String },
    #[serde(rename = "UNSUPPORTED_RESOURCE")]
    UnsupportedResource { resource_type: String },
}

impl fmt::Display for SynthesisIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SynthesisIssue::ParseAmbiguity => {
                f.write_str("説明文から既知のアクション（リサイズ/削除）を判別できませんでした")
            }
            SynthesisIssue::MissingMachineType => f.write_str(
                "マシンタイプ変更の推奨ですが、変更先のマシンタイプを説明文から取り出せませんでした",
            ),
            SynthesisIssue::MissingZone => f.write_str(
                "ゾーンが決まりません（推奨にゾーンがなく、既定ゾーンも未設定です）",
            ),
            SynthesisIssue::UnsafeArgument { value } => {
                write!(f, "コマンド引数に使えない文字を含みます: {value:?}")
            }
            SynthesisIssue::UnsupportedResource { resource_type } => {
                write!(f, "このリソース種別の削除コマンドは生成できません: {resource_type}")
            }
        }
    }
}

/// Outcome of synthesis. Always produced, even for unusable input: in that
/// case `issue` is set and `command` is a shell comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    pub intent: Intent,
    pub command: String,
    pub resource_id: String,
    pub zone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_type: Option<String>,
    pub confidence: Confidence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<SynthesisIssue>,
}

impl CommandResult {
    pub fn is_actionable(&self) -> bool {
        self.intent != Intent::Unknown && self.issue.is_none()
    }

    pub fn is_comment(&self) -> bool {
        self.command.starts_with('#')
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synthesizer {
    cli: String,
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self {
            cli: DEFAULT_CLI.to_string(),
        }
    }
}

pub fn synthesize(recommendation: &Recommendation, zone: &str) -> CommandResult {
    Synthesizer::default().synthesize(recommendation, zone)
}

struct Plan<'a> {
    intent: Intent,
    resource_id: &'a str,
    zone: &'a str,
    machine_type: Option<&'a str>,
    confidence: Confidence,
}

impl Synthesizer {
    pub fn new(cli: impl Into<String>) -> Self {
        let cli = cli.into();
        let cli = cli.trim();
        if cli.is_empty() {
            return Self::default();
        }
        Self {
            cli: cli.to_string(),
        }
    }

    pub fn cli(&self) -> &str {
        &self.cli
    }

    pub fn synthesize(&self, recommendation: &Recommendation, fallback_zone: &str) -> CommandResult {
        let zone = resolve_zone(recommendation.zone.as_deref(), fallback_zone);

        let target = recommendation
            .target_resource_id
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        if let (Some(target), Some(kind)) = (target, recommendation.action_kind) {
            let machine_type = recommendation
                .action_params
                .get("machine_type")
                .map(|s| s.trim())
                .filter(|s| !s.is_empty());
            return self.render(Plan {
                intent: kind.into(),
                resource_id: target,
                zone,
                machine_type,
                confidence: Confidence::Structured,
            });
        }

        let description = recommendation.description.as_str();
        let (intent, machine_type) = classify(description);
        self.render(Plan {
            intent,
            resource_id: recommendation.description_head(),
            zone,
            machine_type,
            confidence: Confidence::Heuristic,
        })
    }

    pub fn zombie_command(&self, zombie: &ZombieResource, fallback_zone: &str) -> CommandResult {
        let name = match zombie.name.trim() {
            "" => zombie.resource_id.trim(),
            name => name,
        };
        let zone = zombie.zone_or(fallback_zone.trim()).trim();

        let (noun, location_flag, location) = match zombie.resource_type {
            ResourceType::GceInstance => ("instances", "--zone", zone.to_string()),
            ResourceType::Disk => ("disks", "--zone", zone.to_string()),
            ResourceType::IpAddress => {
                let region = zombie.region().unwrap_or_else(|| region_of(zone));
                ("addresses", "--region", region.to_string())
            }
            ResourceType::Other => {
                let issue = SynthesisIssue::UnsupportedResource {
                    resource_type: zombie.resource_type.to_string(),
                };
                return CommandResult {
                    intent: Intent::Unknown,
                    command: comment_for(&issue),
                    resource_id: name.to_string(),
                    zone: zone.to_string(),
                    machine_type: None,
                    confidence: Confidence::Structured,
                    issue: Some(issue),
                };
            }
        };

        let mut result = CommandResult {
            intent: Intent::Delete,
            command: String::new(),
            resource_id: name.to_string(),
            zone: location.clone(),
            machine_type: None,
            confidence: Confidence::Structured,
            issue: None,
        };
        let issue = if name.is_empty() {
            Some(SynthesisIssue::ParseAmbiguity)
        } else {
            check_arguments(name, &location, None)
        };
        if let Some(issue) = issue {
            result.command = comment_for(&issue);
            result.issue = Some(issue);
            return result;
        }
        result.command = format!(
            "{} {noun} delete {name} {location_flag} {location}",
            self.cli
        );
        result
    }

    fn render(&self, plan: Plan<'_>) -> CommandResult {
        let mut result = CommandResult {
            intent: plan.intent,
            command: String::new(),
            resource_id: plan.resource_id.to_string(),
            zone: plan.zone.to_string(),
            machine_type: plan.machine_type.map(str::to_string),
            confidence: plan.confidence,
            issue: None,
        };

        let issue = match plan.intent {
            Intent::Unknown => Some(SynthesisIssue::ParseAmbiguity),
            Intent::Resize if plan.machine_type.is_none() => {
                Some(SynthesisIssue::MissingMachineType)
            }
            _ if plan.resource_id.is_empty() => Some(SynthesisIssue::ParseAmbiguity),
            _ => check_arguments(plan.resource_id, plan.zone, plan.machine_type),
        };
        if let Some(issue) = issue {
            result.command = comment_for(&issue);
            result.issue = Some(issue);
            return result;
        }

        result.command = match (plan.intent, plan.machine_type) {
            (Intent::Resize, Some(machine_type)) => format!(
                "{} instances set-machine-type {} --zone {} --machine-type {machine_type}",
                self.cli, plan.resource_id, plan.zone
            ),
            _ => format!(
                "{} instances delete {} --zone {}",
                self.cli, plan.resource_id, plan.zone
            ),
        };
        result
    }
}

fn classify(description: &str) -> (Intent, Option<&str>) {
    if description.contains(RESIZE_MARKER) {
        return (Intent::Resize, target_machine_type(description));
    }
    if description.contains(DELETE_MARKER) {
        return (Intent::Delete, None);
    }
    (Intent::Unknown, None)
}

fn target_machine_type(description: &str) -> Option<&str> {
    let mut tokens = description.split_whitespace();
    tokens.by_ref().find(|t| *t == "to")?;
    let next = tokens.next()?;
    let next = next.strip_suffix(',').unwrap_or(next);
    if next.is_empty() { None } else { Some(next) }
}

fn resolve_zone<'a>(own: Option<&'a str>, fallback: &'a str) -> &'a str {
    match own.map(str::trim) {
        Some(zone) if !zone.is_empty() => zone,
        _ => fallback.trim(),
    }
}

fn region_of(zone: &str) -> &str {
    let Some((region, suffix)) = zone.rsplit_once('-') else {
        return zone;
    };
    let is_zone_suffix = suffix.len() == 1 && suffix.chars().all(|c| c.is_ascii_lowercase());
    if is_zone_suffix && region.contains('-') {
        region
    } else {
        zone
    }
}

fn check_arguments(
    resource_id: &str,
    zone: &str,
    machine_type: Option<&str>,
) -> Option<SynthesisIssue> {
    if zone.is_empty() {
        return Some(SynthesisIssue::MissingZone);
    }
    [Some(resource_id), Some(zone), machine_type]
        .into_iter()
        .flatten()
        .find(|value| !is_safe_argument(value))
        .map(|value| SynthesisIssue::UnsafeArgument {
            value: value.to_string(),
        })
}

fn is_safe_argument(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '/' | '-'))
}

fn comment_for(issue: &SynthesisIssue) -> String {
    let reason: String = issue
        .to_string()
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    format!("# コマンドは生成されませんでした: {reason}")
}
