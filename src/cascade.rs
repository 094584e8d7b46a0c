//! Replay-time resolution cascade.
//!
//! Stages run strictly one after another against the live page: site cache,
//! stored primary, identity strategies, stored fallbacks, the v2 legacy list,
//! v4 enhanced fallbacks, the two rescue heuristics and finally the recorded
//! coordinates. Every candidate must pass the same validation: exactly one
//! match, or a tie-break winner for pointer actions, or the first editable
//! match for input actions. A stage that errors or times out only advances the
//! cascade.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::cache::{CachedSelector, SiteCache, page_hash, split_url};
use crate::capture::Capturer;
use crate::config::ResolverConfig;
use crate::driver::{DevTools, MatchedElement, PageDriver};
use crate::errors::ResolveError;
use crate::generator::{
    CONF_ARIA_LABEL, CONF_NAME_ATTR, CONF_PLACEHOLDER, CONF_ROLE_NAME, CONF_STABLE_ID,
    CONF_TAG_TEXT, CONF_TEST_ID, CONF_UNIQUE_TYPE, FORM_TAGS, UNIQUE_INPUT_TYPES, id_selector,
    structural_locators,
};
use crate::locator::{Locator, Query, quote};
use crate::rescue::{self, RescueMatch};
use crate::stability::{is_stable_id, normalize_whitespace, strip_dynamic_state};
use crate::step::StepPlan;
use crate::types::{
    ActionType, ElementIdentity, HealingRecord, MatchStrategy, SelectorStrategy, SelectorWithScore,
    priority_confidence,
};

/// Confidence reported for a visual-similarity match
pub const VISUAL_CONFIDENCE: i32 = 70;
/// Confidence reported for a text-pattern variation
pub const TEXT_PATTERN_CONFIDENCE: i32 = 60;
/// Confidence reported for a structural-position locator
pub const STRUCTURAL_CONFIDENCE: i32 = 40;
/// Confidence reported for a coordinates-only resolution
pub const COORDINATES_CONFIDENCE: i32 = 30;

/// Accessibility roles that are never trusted to pick an input field
const POINTER_ROLES: &[&str] = &["tab", "button", "link"];

/// What the caller acts on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Target {
    Locator { locator: Locator },
    /// No locator; the caller clicks (and types) at the point
    Point { x: f64, y: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_used: Option<MatchStrategy>,
    /// Selector string of the winning candidate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default)]
    pub confidence: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healing_record: Option<HealingRecord>,
    #[serde(default)]
    pub attempted: Vec<MatchStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResolveOutcome {
    fn failure(error: String, attempted: Vec<MatchStrategy>) -> Self {
        ResolveOutcome {
            success: false,
            target: None,
            strategy_used: None,
            selector: None,
            confidence: 0,
            healing_record: None,
            attempted,
            error: Some(error),
        }
    }

    pub fn locator(&self) -> Option<&Locator> {
        match &self.target {
            Some(Target::Locator { locator }) => Some(locator),
            _ => None,
        }
    }
}

/// Tie-break weight of one match; `None` for invisible or non-clickable kinds.
/// Exact text, or text that only extends the label by a few characters, earns +10.
pub fn tie_break_score(element: &MatchedElement, label: Option<&str>) -> Option<i32> {
    if !element.visible {
        return None;
    }
    let tag = element.tag_name.to_uppercase();
    let classes = element.attr("class").unwrap_or_default();
    let base = if tag == "BUTTON" {
        100
    } else if tag == "A" {
        90
    } else if element.role() == Some("button") {
        80
    } else if classes.contains("btn") || classes.contains("button") {
        70
    } else if tag == "INPUT" {
        60
    } else {
        return None;
    };

    let bonus = label
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .is_some_and(|label| {
            let text: String = element.text.trim().chars().take(50).collect();
            text == label
                || (text.starts_with(label) && text.chars().count() < label.chars().count() + 5)
        });
    Some(base + if bonus { 10 } else { 0 })
}

/// Index of the best-scoring match; the earliest wins ties
pub fn pick_by_tie_break(matches: &[MatchedElement], label: Option<&str>) -> Option<usize> {
    let mut best: Option<(usize, i32)> = None;
    for element in matches {
        let Some(score) = tie_break_score(element, label) else {
            continue;
        };
        if best.is_none_or(|(_, s)| score > s) {
            best = Some((element.index, score));
        }
    }
    best.map(|(index, score)| {
        debug!("Tie-break winner: match {} (score {})", index, score);
        index
    })
}

#[derive(Clone, Copy)]
enum Matcher {
    Static(fn(&ElementIdentity) -> Option<Locator>),
    Visual,
}

/// One identity-driven strategy: how to build a locator and when to skip it
struct IdentityStrategy {
    strategy: MatchStrategy,
    selector_strategy: SelectorStrategy,
    confidence: i32,
    matcher: Matcher,
    skip_for_input: fn(&ElementIdentity) -> bool,
}

fn never(_: &ElementIdentity) -> bool {
    false
}

fn always(_: &ElementIdentity) -> bool {
    true
}

fn pointer_role(identity: &ElementIdentity) -> bool {
    identity
        .ax_role
        .as_deref()
        .is_some_and(|r| POINTER_ROLES.contains(&r))
}

fn by_accessibility(identity: &ElementIdentity) -> Option<Locator> {
    let (role, name) = identity.ax_pair()?;
    Some(Locator::role(role, Some(strip_dynamic_state(name))))
}

fn by_aria_label(identity: &ElementIdentity) -> Option<Locator> {
    let label = identity.aria_label.as_deref().filter(|l| !l.trim().is_empty())?;
    Some(Locator::css(format!("[aria-label={}]", quote(label))))
}

fn by_name(identity: &ElementIdentity) -> Option<Locator> {
    let name = identity.name.as_deref().filter(|n| !n.is_empty())?;
    let tag = identity.tag();
    if !FORM_TAGS.contains(&tag.as_str()) {
        return None;
    }
    Some(Locator::css(format!("{}[name={}]", tag, quote(name))))
}

fn by_test_id(identity: &ElementIdentity) -> Option<Locator> {
    let id = identity.data_test_id.as_deref().filter(|v| !v.is_empty())?;
    Some(Locator::new(Query::TestId { id: id.to_string() }))
}

fn by_placeholder(identity: &ElementIdentity) -> Option<Locator> {
    let text = identity.placeholder.as_deref().filter(|v| !v.is_empty())?;
    Some(Locator::new(Query::Placeholder {
        text: text.to_string(),
    }))
}

fn by_input_type(identity: &ElementIdentity) -> Option<Locator> {
    let input_type = identity.input_type.as_deref()?;
    if identity.tag() != "input" || !UNIQUE_INPUT_TYPES.contains(&input_type) {
        return None;
    }
    Some(Locator::css(format!("input[type={}]", quote(input_type))))
}

fn by_stable_id(identity: &ElementIdentity) -> Option<Locator> {
    let id = identity.id.as_deref().filter(|id| is_stable_id(id))?;
    Some(Locator::css(id_selector(&identity.tag(), id)))
}

fn by_text(identity: &ElementIdentity) -> Option<Locator> {
    let text = normalize_whitespace(identity.text_content.as_deref()?);
    if text.chars().count() < 2 {
        return None;
    }
    let tag = identity.tag();
    let tag = if tag.is_empty() { "*".to_string() } else { tag };
    Some(Locator::has_text(tag, text))
}

static IDENTITY_STRATEGIES: [IdentityStrategy; 9] = [
    IdentityStrategy {
        strategy: MatchStrategy::Accessibility,
        selector_strategy: SelectorStrategy::Role,
        confidence: CONF_ROLE_NAME,
        matcher: Matcher::Static(by_accessibility),
        skip_for_input: pointer_role,
    },
    IdentityStrategy {
        strategy: MatchStrategy::AriaLabel,
        selector_strategy: SelectorStrategy::Css,
        confidence: CONF_ARIA_LABEL,
        matcher: Matcher::Static(by_aria_label),
        skip_for_input: never,
    },
    IdentityStrategy {
        strategy: MatchStrategy::Name,
        selector_strategy: SelectorStrategy::Css,
        confidence: CONF_NAME_ATTR,
        matcher: Matcher::Static(by_name),
        skip_for_input: never,
    },
    IdentityStrategy {
        strategy: MatchStrategy::TestId,
        selector_strategy: SelectorStrategy::TestId,
        confidence: CONF_TEST_ID,
        matcher: Matcher::Static(by_test_id),
        skip_for_input: never,
    },
    IdentityStrategy {
        strategy: MatchStrategy::Placeholder,
        selector_strategy: SelectorStrategy::Placeholder,
        confidence: CONF_PLACEHOLDER,
        matcher: Matcher::Static(by_placeholder),
        skip_for_input: never,
    },
    IdentityStrategy {
        strategy: MatchStrategy::InputType,
        selector_strategy: SelectorStrategy::Css,
        confidence: CONF_UNIQUE_TYPE,
        matcher: Matcher::Static(by_input_type),
        skip_for_input: never,
    },
    IdentityStrategy {
        strategy: MatchStrategy::StableId,
        selector_strategy: SelectorStrategy::Css,
        confidence: CONF_STABLE_ID,
        matcher: Matcher::Static(by_stable_id),
        skip_for_input: never,
    },
    IdentityStrategy {
        strategy: MatchStrategy::Visual,
        selector_strategy: SelectorStrategy::Role,
        confidence: VISUAL_CONFIDENCE,
        matcher: Matcher::Visual,
        skip_for_input: never,
    },
    IdentityStrategy {
        strategy: MatchStrategy::Text,
        selector_strategy: SelectorStrategy::Text,
        confidence: CONF_TAG_TEXT,
        matcher: Matcher::Static(by_text),
        skip_for_input: always,
    },
];

#[derive(Clone, Copy)]
enum Stage {
    Cached,
    Primary,
    Identity(&'static IdentityStrategy),
    Fallback,
    Legacy,
    Enhanced,
    Geometric,
    Fuzzy,
    Coordinates,
}

impl Stage {
    fn all() -> Vec<Stage> {
        let mut stages = vec![Stage::Cached, Stage::Primary];
        stages.extend(IDENTITY_STRATEGIES.iter().map(Stage::Identity));
        stages.extend([
            Stage::Fallback,
            Stage::Legacy,
            Stage::Enhanced,
            Stage::Geometric,
            Stage::Fuzzy,
            Stage::Coordinates,
        ]);
        stages
    }

    fn strategy(&self) -> MatchStrategy {
        match self {
            Stage::Cached => MatchStrategy::Cached,
            Stage::Primary => MatchStrategy::Primary,
            Stage::Identity(s) => s.strategy,
            Stage::Fallback => MatchStrategy::Fallback,
            Stage::Legacy => MatchStrategy::Legacy,
            Stage::Enhanced => MatchStrategy::Enhanced,
            Stage::Geometric => MatchStrategy::Geometric,
            Stage::Fuzzy => MatchStrategy::Fuzzy,
            Stage::Coordinates => MatchStrategy::Coordinates,
        }
    }

    /// Skipped wholesale for input actions
    fn skip_for_input(&self, plan: &StepPlan) -> bool {
        match self {
            Stage::Identity(s) => plan.identity.as_ref().is_some_and(|i| (s.skip_for_input)(i)),
            Stage::Fuzzy => true,
            _ => false,
        }
    }
}

/// Where the page under resolution sits in the site cache
#[derive(Debug, Clone)]
struct PageKey {
    domain: String,
    path: String,
    page_hash: String,
}

struct Ctx<'a> {
    plan: &'a StepPlan,
    input: bool,
    page: Option<PageKey>,
}

enum Candidate {
    Locate {
        locator: Locator,
        selector: SelectorWithScore,
    },
    Point {
        x: f64,
        y: f64,
    },
}

impl From<RescueMatch> for Candidate {
    fn from(found: RescueMatch) -> Self {
        Candidate::Locate {
            locator: found.locator,
            selector: found.selector,
        }
    }
}

struct Found {
    strategy: MatchStrategy,
    target: Target,
    selector: SelectorWithScore,
    unique: bool,
}

enum StageResult {
    /// Nothing to try at this stage
    Skipped,
    Missed,
    Found(Found),
}

/// Textual signals that describe someone else's label when the target is an input
fn is_textual_candidate(selector: &SelectorWithScore, locator: &Locator) -> bool {
    selector.strategy.is_textual()
        || matches!(locator.query, Query::Text { .. } | Query::HasText { .. })
}

/// Stored selectors that parse, minus textual ones for input actions
fn parse_stored(
    selectors: impl IntoIterator<Item = SelectorWithScore>,
    input: bool,
) -> Vec<Candidate> {
    selectors
        .into_iter()
        .filter_map(|selector| match Locator::from_candidate(&selector) {
            Ok(locator) => Some((locator, selector)),
            Err(e) => {
                debug!("Skipping unparsable selector {}: {}", selector.value, e);
                None
            }
        })
        .filter(|(locator, selector)| {
            let skip = input && is_textual_candidate(selector, locator);
            if skip {
                debug!("Skipping textual selector {} for input action", selector.value);
            }
            !skip
        })
        .map(|(locator, selector)| Candidate::Locate { locator, selector })
        .collect()
}

pub struct Resolver {
    driver: Arc<dyn PageDriver>,
    capturer: Option<Capturer>,
    cache: Option<Arc<SiteCache>>,
    config: ResolverConfig,
    history: Mutex<Vec<HealingRecord>>,
}

impl Resolver {
    pub fn new(
        driver: Arc<dyn PageDriver>,
        devtools: Option<Arc<dyn DevTools>>,
        cache: Option<Arc<SiteCache>>,
        config: ResolverConfig,
    ) -> Self {
        let capturer = devtools
            .as_ref()
            .map(|d| Capturer::new(d.clone(), config.clone()));
        Resolver {
            driver,
            capturer,
            cache,
            config,
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Every healing record produced by this resolver, oldest first
    pub fn healing_history(&self) -> Vec<HealingRecord> {
        self.history
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    /// Walk the cascade for one step. A run that failed after seeing a stale
    /// context refreshes the DevTools session and is retried once.
    pub async fn resolve(&self, plan: &StepPlan, action: ActionType) -> ResolveOutcome {
        let mut outcome = self.resolve_bounded(plan, action).await;
        if !outcome.success && outcome.error.as_deref() == Some(STALE_MARKER) {
            info!("Page context went stale during resolution; refreshing and retrying");
            self.refresh_session().await;
            outcome = self.resolve_bounded(plan, action).await;
            if outcome.error.as_deref() == Some(STALE_MARKER) {
                outcome.error = Some(exhausted_message(plan));
            }
        }
        outcome
    }

    async fn resolve_bounded(&self, plan: &StepPlan, action: ActionType) -> ResolveOutcome {
        let mut attempted = Vec::new();
        let mut stale = false;
        let step_timeout = self.config.step_timeout();
        let result = timeout(
            step_timeout,
            self.resolve_once(plan, action, &mut attempted, &mut stale),
        )
        .await;

        match result {
            Ok(Some(found)) => self.finish(plan, found, attempted),
            Ok(None) if stale => ResolveOutcome::failure(STALE_MARKER.to_string(), attempted),
            Ok(None) => {
                warn!("Resolution exhausted for {}", plan.primary_selector());
                ResolveOutcome::failure(exhausted_message(plan), attempted)
            }
            Err(_) => {
                warn!(
                    "Resolution of {} timed out after {} ms",
                    plan.primary_selector(),
                    step_timeout.as_millis()
                );
                ResolveOutcome::failure(
                    format!(
                        "Step timed out after {} ms while resolving {}",
                        step_timeout.as_millis(),
                        plan.primary_selector()
                    ),
                    attempted,
                )
            }
        }
    }

    async fn resolve_once(
        &self,
        plan: &StepPlan,
        action: ActionType,
        attempted: &mut Vec<MatchStrategy>,
        stale: &mut bool,
    ) -> Option<Found> {
        let ctx = Ctx {
            plan,
            input: action.is_input(),
            page: self.page_key(plan).await,
        };

        for stage in Stage::all() {
            let strategy = stage.strategy();
            if ctx.input && stage.skip_for_input(plan) {
                debug!("Skipping {} for input action", strategy);
                continue;
            }
            let attempt = timeout(
                self.config.strategy_timeout(),
                self.try_stage(stage, &ctx, stale),
            )
            .await;
            match attempt {
                Ok(StageResult::Skipped) => {}
                Ok(StageResult::Missed) => {
                    attempted.push(strategy);
                    debug!("{} missed", strategy);
                }
                Ok(StageResult::Found(found)) => {
                    attempted.push(strategy);
                    return Some(found);
                }
                Err(_) => {
                    attempted.push(strategy);
                    debug!(
                        "{}",
                        ResolveError::Timeout(self.config.strategy_timeout_ms)
                    );
                }
            }
        }
        None
    }

    async fn try_stage(&self, stage: Stage, ctx: &Ctx<'_>, stale: &mut bool) -> StageResult {
        let candidates = self.candidates(stage, ctx).await;
        if candidates.is_empty() {
            return if self.evaluates_live(stage, ctx) {
                StageResult::Missed
            } else {
                StageResult::Skipped
            };
        }
        for candidate in candidates {
            match candidate {
                Candidate::Point { x, y } => {
                    return StageResult::Found(Found {
                        strategy: stage.strategy(),
                        target: Target::Point { x, y },
                        selector: SelectorWithScore::css(
                            format!("coordinates({:.0}, {:.0})", x, y),
                            COORDINATES_CONFIDENCE,
                        ),
                        unique: false,
                    });
                }
                Candidate::Locate { locator, selector } => {
                    match self.validate(&locator, ctx).await {
                        Ok((locator, unique)) => {
                            debug!("{} matched {}", stage.strategy(), locator);
                            return StageResult::Found(Found {
                                strategy: stage.strategy(),
                                target: Target::Locator { locator },
                                selector,
                                unique,
                            });
                        }
                        Err(e) => {
                            if e.is_stale() {
                                *stale = true;
                            }
                            debug!("{} candidate {}: {}", stage.strategy(), selector.value, e);
                        }
                    }
                }
            }
        }
        StageResult::Missed
    }

    /// Stages that searched the live page even when they produced no candidate
    fn evaluates_live(&self, stage: Stage, ctx: &Ctx<'_>) -> bool {
        let plan = ctx.plan;
        match stage {
            Stage::Cached => ctx.page.is_some() && plan.element_hash.is_some(),
            Stage::Identity(s) => {
                matches!(s.matcher, Matcher::Visual)
                    && self.capturer.is_some()
                    && plan
                        .identity
                        .as_ref()
                        .is_some_and(|i| i.bounding_box.is_some_and(|b| !b.is_zero()))
            }
            Stage::Geometric => plan.coordinates.is_some() && plan.recorded_tag.is_some(),
            Stage::Coordinates => plan.coordinates.is_some(),
            Stage::Fuzzy => plan.text.as_deref().is_some_and(|t| t.chars().count() > 2),
            _ => false,
        }
    }

    async fn candidates(&self, stage: Stage, ctx: &Ctx<'_>) -> Vec<Candidate> {
        let plan = ctx.plan;
        match stage {
            Stage::Cached => self.cached_candidate(ctx).await.into_iter().collect(),
            Stage::Primary => parse_stored(plan.primary.clone(), ctx.input),
            Stage::Identity(s) => {
                let Some(identity) = plan.identity.as_ref() else {
                    return Vec::new();
                };
                match s.matcher {
                    Matcher::Static(build) => build(identity)
                        .map(|locator| Candidate::Locate {
                            selector: SelectorWithScore::new(
                                s.selector_strategy,
                                locator.to_string(),
                                s.confidence,
                            ),
                            locator,
                        })
                        .into_iter()
                        .collect(),
                    Matcher::Visual => self.visual_candidate(identity).await.into_iter().collect(),
                }
            }
            Stage::Fallback => parse_stored(plan.fallbacks.clone(), ctx.input),
            Stage::Legacy => parse_stored(
                plan.legacy.iter().map(|s| {
                    SelectorWithScore::new(
                        s.strategy,
                        s.value.clone(),
                        priority_confidence(s.priority),
                    )
                }),
                ctx.input,
            ),
            Stage::Enhanced => enhanced_candidates(plan, ctx.input),
            Stage::Geometric => match (plan.coordinates, plan.recorded_tag.as_deref()) {
                (Some(coordinates), Some(tag)) => {
                    rescue::geometric(self.driver.as_ref(), coordinates, tag)
                        .await
                        .map(Candidate::from)
                        .into_iter()
                        .collect()
                }
                _ => Vec::new(),
            },
            Stage::Fuzzy => match plan.text.as_deref() {
                Some(text) => {
                    rescue::fuzzy(self.driver.as_ref(), text, self.config.fuzzy_max_text_len)
                        .await
                        .map(Candidate::from)
                        .into_iter()
                        .collect()
                }
                None => Vec::new(),
            },
            Stage::Coordinates => self.coordinates_candidate(plan).await.into_iter().collect(),
        }
    }

    async fn page_key(&self, plan: &StepPlan) -> Option<PageKey> {
        self.cache.as_ref()?;
        plan.element_hash.as_ref()?;
        let url = self.driver.current_url().await.ok()?;
        let (domain, path) = split_url(&url)?;
        let signature = match self.driver.page_signature(self.config.signature_limit).await {
            Ok(signature) => signature,
            Err(e) => {
                debug!("Page signature unavailable: {}", e);
                return None;
            }
        };
        Some(PageKey {
            domain,
            path,
            page_hash: page_hash(&signature),
        })
    }

    async fn cached_candidate(&self, ctx: &Ctx<'_>) -> Option<Candidate> {
        let cache = self.cache.as_ref()?;
        let page = ctx.page.as_ref()?;
        let element_hash = ctx.plan.element_hash.as_deref()?;

        if cache
            .is_page_changed(&page.domain, &page.path, &page.page_hash)
            .await
        {
            cache
                .save_page_hash(&page.domain, &page.path, &page.page_hash)
                .await;
        }
        let entry = cache.get(&page.domain, &page.path, element_hash).await?;
        if entry.page_hash != page.page_hash {
            debug!("Cached selector {} belongs to another page version", entry.selector);
            return None;
        }
        if entry.success_rate < self.config.min_cache_success_rate {
            debug!(
                "Cached selector {} below trust threshold ({:.1})",
                entry.selector, entry.success_rate
            );
            return None;
        }
        let selector = entry.as_candidate();
        parse_stored(Some(selector), ctx.input).into_iter().next()
    }

    /// Interactive element of similar size, position and role, located by role and name
    async fn visual_candidate(&self, identity: &ElementIdentity) -> Option<Candidate> {
        let capturer = self.capturer.as_ref()?;
        let recorded = identity.bounding_box.filter(|b| !b.is_zero())?;
        for element in capturer.scan_interactive_elements().await {
            if !recorded.is_similar(
                &element.bounding_box,
                self.config.visual_size_tolerance,
                self.config.visual_position_tolerance,
            ) {
                continue;
            }
            if identity
                .ax_role
                .as_deref()
                .is_some_and(|role| role != element.role)
            {
                continue;
            }
            if element.name.is_empty() {
                continue;
            }
            let locator = Locator::role(element.role.clone(), Some(element.name.clone()));
            if matches!(self.driver.count(&locator).await, Ok(1)) {
                debug!("Visual match: {} \"{}\"", element.role, element.name);
                return Some(Candidate::Locate {
                    selector: SelectorWithScore::new(
                        SelectorStrategy::Role,
                        locator.to_string(),
                        VISUAL_CONFIDENCE,
                    ),
                    locator,
                });
            }
        }
        None
    }

    async fn coordinates_candidate(&self, plan: &StepPlan) -> Option<Candidate> {
        let coordinates = plan.coordinates?;
        let (x, y) = coordinates.center();
        match self.driver.element_at_point(x, y).await {
            Ok(Some(element)) if element.visible => Some(Candidate::Point { x, y }),
            Ok(_) => {
                debug!("Nothing visible at recorded point ({}, {})", x, y);
                None
            }
            Err(e) => {
                debug!("Point lookup failed: {}", e);
                None
            }
        }
    }

    /// Narrow a candidate to one actionable element. Returns the locator to use
    /// and whether the candidate itself was unique.
    async fn validate(
        &self,
        locator: &Locator,
        ctx: &Ctx<'_>,
    ) -> Result<(Locator, bool), ResolveError> {
        if locator.nth.is_some() {
            let found = self.driver.inspect(locator, 1).await?;
            let element = found
                .first()
                .ok_or_else(|| ResolveError::NodeNotFound(locator.to_string()))?;
            if ctx.input && !element.editable {
                return Err(ResolveError::EditableMismatch(locator.to_string()));
            }
            return Ok((locator.clone(), false));
        }

        let count = self.driver.count(locator).await?;
        if count == 0 {
            return Err(ResolveError::NodeNotFound(locator.to_string()));
        }

        if ctx.input {
            let matches = self
                .driver
                .inspect(locator, self.config.tie_break_limit)
                .await?;
            let editable = matches
                .iter()
                .find(|m| m.editable)
                .ok_or_else(|| ResolveError::EditableMismatch(locator.to_string()))?;
            return Ok(if count == 1 {
                (locator.clone(), true)
            } else {
                debug!("Using editable match {} of {}", editable.index, count);
                (locator.nth(editable.index), false)
            });
        }

        if count == 1 {
            return Ok((locator.clone(), true));
        }

        let matches = self
            .driver
            .inspect(locator, self.config.tie_break_limit)
            .await?;
        match pick_by_tie_break(&matches, ctx.plan.label.as_deref()) {
            Some(index) => Ok((locator.nth(index), false)),
            None => Err(ResolveError::AmbiguousMatch {
                selector: locator.to_string(),
                count,
            }),
        }
    }

    fn finish(&self, plan: &StepPlan, found: Found, attempted: Vec<MatchStrategy>) -> ResolveOutcome {
        let healing_record = (!found.strategy.is_recorded_path()).then(|| HealingRecord {
            timestamp: Utc::now(),
            original_selector: plan.primary_selector().to_string(),
            healed_selector: found.selector.value.clone(),
            strategy: found.strategy,
            success: true,
            selector_strategy: Some(found.selector.strategy),
            confidence: found.selector.confidence,
            attempted: attempted.clone(),
        });

        if let Some(record) = &healing_record {
            info!(
                "Healed {} -> {} via {}",
                record.original_selector, record.healed_selector, record.strategy
            );
            if let Ok(mut history) = self.history.lock() {
                history.push(record.clone());
            }
        } else {
            debug!("Resolved {} via {}", found.selector.value, found.strategy);
        }

        ResolveOutcome {
            success: true,
            target: Some(found.target),
            strategy_used: Some(found.strategy),
            selector: Some(found.selector.value),
            confidence: found.selector.confidence,
            healing_record,
            attempted,
            error: None,
        }
    }

    /// Remember a unique, non-cached resolution for this page version
    pub async fn remember(&self, plan: &StepPlan, outcome: &ResolveOutcome) {
        let (Some(cache), Some(element_hash)) = (self.cache.as_ref(), plan.element_hash.as_ref())
        else {
            return;
        };
        if !outcome.success || outcome.strategy_used == Some(MatchStrategy::Cached) {
            return;
        }
        let Some(locator) = outcome.locator().filter(|l| l.nth.is_none()) else {
            return;
        };
        let Some(page) = self.page_key(plan).await else {
            return;
        };
        let strategy = outcome
            .healing_record
            .as_ref()
            .and_then(|r| r.selector_strategy)
            .or(plan.primary.as_ref().map(|p| p.strategy))
            .unwrap_or(SelectorStrategy::Css);
        cache
            .upsert(CachedSelector {
                domain: page.domain,
                path: page.path,
                element_hash: element_hash.clone(),
                page_hash: page.page_hash,
                selector: outcome.selector.clone().unwrap_or_else(|| locator.to_string()),
                strategy,
                confidence: outcome.confidence,
                fallbacks: plan.fallbacks.clone(),
                bounding_box: plan.coordinates,
                element_type: plan.recorded_tag.clone().unwrap_or_default(),
                element_role: plan.identity.as_ref().and_then(|i| i.ax_role.clone()),
                hit_count: 0,
                success_rate: 100.0,
                updated_at: Utc::now(),
            })
            .await;
    }

    /// Report a resolution outcome to the site cache's success-rate average
    pub async fn record_result(&self, plan: &StepPlan, success: bool) {
        let (Some(cache), Some(element_hash)) = (self.cache.as_ref(), plan.element_hash.as_ref())
        else {
            return;
        };
        let Ok(url) = self.driver.current_url().await else {
            return;
        };
        if let Some((domain, path)) = split_url(&url) {
            cache
                .record_result(&domain, &path, element_hash, success)
                .await;
        }
    }

    /// Reattach the DevTools session, e.g. after a navigation
    pub async fn refresh_session(&self) -> bool {
        match &self.capturer {
            Some(capturer) => capturer.refresh_session().await,
            None => false,
        }
    }
}

const STALE_MARKER: &str = "stale page context";

fn exhausted_message(plan: &StepPlan) -> String {
    let what = plan
        .label
        .as_deref()
        .map(|l| format!("\"{}\"", l))
        .unwrap_or_else(|| plan.primary_selector().to_string());
    format!(
        "Could not find element {} on the current page: every strategy and both rescue heuristics failed",
        what
    )
}

/// v4 selectors plus structural positions; text and label ones are dropped for input actions
fn enhanced_candidates(plan: &StepPlan, input: bool) -> Vec<Candidate> {
    let mut out = Vec::new();
    let mut push = |selector: SelectorWithScore| match Locator::parse(None, &selector.value) {
        Ok(locator) => out.push(Candidate::Locate { locator, selector }),
        Err(e) => debug!("Skipping enhanced selector {}: {}", selector.value, e),
    };

    if let Some(enhanced) = &plan.enhanced {
        if !input {
            for s in &enhanced.text_selectors {
                push(SelectorWithScore::new(
                    SelectorStrategy::Text,
                    s.selector.clone(),
                    s.confidence as i32,
                ));
            }
        }
        for s in &enhanced.parent_chain_selectors {
            push(SelectorWithScore::css(s.full_selector.clone(), s.confidence as i32));
        }
        if !input {
            for s in &enhanced.nearby_label_selectors {
                push(SelectorWithScore::new(
                    SelectorStrategy::Label,
                    s.target_selector.clone(),
                    s.confidence as i32,
                ));
            }
        }
    }

    if !input && let Some(patterns) = &plan.text_patterns {
        let tag = plan.recorded_tag.clone().unwrap_or_else(|| "*".to_string());
        for variation in &patterns.variations {
            push(SelectorWithScore::new(
                SelectorStrategy::Text,
                format!("{}:has-text({})", tag, quote(&variation.value)),
                TEXT_PATTERN_CONFIDENCE,
            ));
        }
    }

    if let (Some(structure), Some(tag)) = (&plan.structural_position, plan.recorded_tag.as_deref())
    {
        for locator in structural_locators(structure, tag, plan.is_form_field()) {
            out.push(Candidate::Locate {
                selector: SelectorWithScore::css(locator.to_string(), STRUCTURAL_CONFIDENCE),
                locator,
            });
        }
    }
    out
}

#[cfg(test)]
#[path = "cascade_test.rs"]
mod cascade_test;
