//! Extraction collaborator boundary
//!
//! The collaborator turns free ticket text into a JSON payload of candidate
//! entities. Its output is never trusted: [`parse_extraction_payload`]
//! decodes it into a tagged union and rejects anything that does not
//! conform, so a bad payload can never reach the graph.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::confidence::bound_confidence;
use super::entity::EntityType;
use super::ticket::TicketInput;
use crate::error::{Error, Result};
use crate::llm::LlmClient;

/// Source of raw extraction responses
#[async_trait]
pub trait ExtractionCollaborator: Send + Sync {
    /// Collaborator name for logging and provenance
    fn name(&self) -> &'static str;

    /// Return the raw response text for one ticket
    async fn extract(&self, ticket: &TicketInput) -> Result<String>;
}

/// Top-level payload returned by a collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionPayload {
    pub candidates: Vec<Candidate>,
}

/// One extracted candidate, tagged by `kind`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Candidate {
    Equipment(EquipmentCandidate),
    Error(ErrorCandidate),
    Solution(SolutionCandidate),
    Context(ContextCandidate),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentCandidate {
    pub name: String,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorCandidate {
    pub name: String,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionCandidate {
    pub name: String,
    pub confidence: f32,
    /// Ordered resolution steps
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextCandidate {
    pub name: String,
    pub confidence: f32,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// Entity types a context candidate may carry
pub const CONTEXT_TYPES: &[EntityType] = &[
    EntityType::Model,
    EntityType::Os,
    EntityType::Software,
    EntityType::Component,
    EntityType::Symptom,
    EntityType::Location,
    EntityType::User,
];

impl Candidate {
    pub fn name(&self) -> &str {
        match self {
            Self::Equipment(c) => &c.name,
            Self::Error(c) => &c.name,
            Self::Solution(c) => &c.name,
            Self::Context(c) => &c.name,
        }
    }

    pub fn confidence(&self) -> f32 {
        match self {
            Self::Equipment(c) => c.confidence,
            Self::Error(c) => c.confidence,
            Self::Solution(c) => c.confidence,
            Self::Context(c) => c.confidence,
        }
    }

    fn confidence_mut(&mut self) -> &mut f32 {
        match self {
            Self::Equipment(c) => &mut c.confidence,
            Self::Error(c) => &mut c.confidence,
            Self::Solution(c) => &mut c.confidence,
            Self::Context(c) => &mut c.confidence,
        }
    }

    /// Graph type the candidate becomes
    pub fn entity_type(&self) -> EntityType {
        match self {
            Self::Equipment(_) => EntityType::Equipment,
            Self::Error(_) => EntityType::Error,
            Self::Solution(_) => EntityType::Solution,
            Self::Context(c) => c.entity_type,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Self::Equipment(c) => &c.description,
            Self::Error(c) => &c.description,
            Self::Solution(c) => &c.description,
            Self::Context(c) => &c.description,
        }
    }
}

/// A decoded, validated payload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedExtraction {
    pub candidates: Vec<Candidate>,
    /// Indexes of candidates whose confidence was clamped into range
    pub clamped: Vec<usize>,
}

/// Decode and validate a raw collaborator response
///
/// Fails with `ExtractionParseError` on malformed JSON, unknown `kind`,
/// missing or blank names, non-finite confidence, or a context candidate
/// carrying a core type. Out-of-range confidences are clamped and reported.
pub fn parse_extraction_payload(raw: &str) -> Result<ValidatedExtraction> {
    let json = extract_json_from_response(raw);
    let payload: ExtractionPayload = serde_json::from_str(&json)
        .map_err(|e| Error::ExtractionParseError(format!("malformed payload: {}", e)))?;

    let mut validated = ValidatedExtraction::default();
    for (index, mut candidate) in payload.candidates.into_iter().enumerate() {
        if candidate.name().trim().is_empty() {
            return Err(Error::ExtractionParseError(format!(
                "candidate {} has an empty name",
                index
            )));
        }
        if !candidate.confidence().is_finite() {
            return Err(Error::ExtractionParseError(format!(
                "candidate {} ('{}') has a non-finite confidence",
                index,
                candidate.name()
            )));
        }
        if let Candidate::Context(context) = &candidate {
            if !CONTEXT_TYPES.contains(&context.entity_type) {
                return Err(Error::ExtractionParseError(format!(
                    "context candidate '{}' cannot have type '{}'",
                    context.name, context.entity_type
                )));
            }
        }
        if let Candidate::Solution(solution) = &candidate {
            if solution.steps.iter().any(|s| s.trim().is_empty()) {
                return Err(Error::ExtractionParseError(format!(
                    "solution '{}' has a blank step",
                    solution.name
                )));
            }
        }

        let bounded = bound_confidence(candidate.confidence());
        if bounded.clamped {
            warn!(
                candidate = candidate.name(),
                requested = candidate.confidence(),
                "Clamped extraction confidence"
            );
            validated.clamped.push(index);
        }
        *candidate.confidence_mut() = bounded.value;
        validated.candidates.push(candidate);
    }

    debug!(
        candidates = validated.candidates.len(),
        clamped = validated.clamped.len(),
        "Decoded extraction payload"
    );
    Ok(validated)
}

/// Extract JSON from a response that might contain markdown or other text
fn extract_json_from_response(response: &str) -> String {
    if let Some(start) = response.find("```json") {
        let json_start = start + 7;
        if let Some(end) = response[json_start..].find("```") {
            return response[json_start..json_start + end].trim().to_string();
        }
    }

    if let Some(start) = response.find("```") {
        let potential_start = start + 3;
        if let Some(newline) = response[potential_start..].find('\n') {
            let json_start = potential_start + newline + 1;
            if let Some(end) = response[json_start..].find("```") {
                return response[json_start..json_start + end].trim().to_string();
            }
        }
    }

    if let (Some(start), Some(end)) = (response.find('{'), response.rfind('}')) {
        if start < end {
            return response[start..=end].to_string();
        }
    }

    response.to_string()
}

/// Cut text to at most `max_chars` characters
fn truncate_content(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((byte_index, _)) => format!("{}...", &content[..byte_index]),
        None => content.to_string(),
    }
}

/// Collaborator backed by a chat completion model
pub struct LlmExtractionCollaborator {
    client: LlmClient,
    max_description_chars: usize,
}

impl LlmExtractionCollaborator {
    pub fn new(client: LlmClient, max_description_chars: usize) -> Self {
        Self {
            client,
            max_description_chars,
        }
    }

    fn build_prompt(&self, ticket: &TicketInput) -> String {
        format!(
            r#"Analyse this IT support ticket and extract knowledge candidates.

TICKET:
- Id: {id}
- Category: {category}
- Urgency: {urgency}
- Description:
{description}

Return JSON in this exact format:
{{
  "candidates": [
    {{"kind": "equipment", "name": "Dell Latitude 5420", "brand": "Dell", "model": "Latitude 5420", "confidence": 0.9}},
    {{"kind": "error", "name": "écran bleu", "code": "0x0000007B", "confidence": 0.8}},
    {{"kind": "solution", "name": "Mettre à jour le pilote graphique", "steps": ["Ouvrir le gestionnaire de périphériques", "Mettre à jour le pilote"], "confidence": 0.7}},
    {{"kind": "context", "type": "os", "name": "Windows 11", "confidence": 0.7}}
  ]
}}

Context types: model, os, software, component, symptom, location, user.
Only include what the ticket actually states. Use an empty list if nothing applies."#,
            id = ticket.ticket_id,
            category = ticket.category.as_deref().unwrap_or("unknown"),
            urgency = ticket.urgency.map(|u| u.as_str()).unwrap_or("unknown"),
            description = truncate_content(&ticket.description, self.max_description_chars),
        )
    }
}

#[async_trait]
impl ExtractionCollaborator for LlmExtractionCollaborator {
    fn name(&self) -> &'static str {
        "ai_extraction"
    }

    async fn extract(&self, ticket: &TicketInput) -> Result<String> {
        info!(ticket_id = %ticket.ticket_id, "Requesting extraction from LLM");

        let completion = self
            .client
            .complete_json(EXTRACTION_SYSTEM_PROMPT, &self.build_prompt(ticket))
            .await?;

        if completion.truncated {
            warn!(ticket_id = %ticket.ticket_id, "Extraction response hit the token limit");
        }
        Ok(completion.content)
    }
}

const EXTRACTION_SYSTEM_PROMPT: &str = r#"You extract structured knowledge from IT support tickets written in French or English.

Guidelines:
1. Equipment is a physical device; give its brand and model when stated
2. Errors are faults as the user describes them; keep the user's wording (e.g. "écran bleu")
3. Solutions are fixes actually applied or proposed, with ordered steps when known
4. Context covers the operating system, software, components, location and people involved
5. Confidence reflects how explicitly the ticket states the item (0.1 to 1.0)

Return valid JSON only, with no additional text or explanation."#;

/// Offline, lexicon-driven collaborator
///
/// Recognises common brands, device words, error phrases and context terms
/// in French and English and emits the same JSON schema as the LLM.
#[derive(Debug, Default, Clone)]
pub struct HeuristicExtractionCollaborator;

impl HeuristicExtractionCollaborator {
    pub fn new() -> Self {
        Self
    }

    /// Build the payload for a piece of text
    pub fn extract_payload(&self, text: &str) -> ExtractionPayload {
        let tokens = tokenize(text);
        let lowered: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();
        let normalized = format!(" {} ", lowered.join(" "));
        let mut candidates = Vec::new();

        candidates.extend(detect_equipment(&tokens, &lowered, &normalized));

        let mut seen_errors = Vec::new();
        for (phrase, description) in ERROR_PHRASES {
            if contains_phrase(&normalized, phrase) && !seen_errors.contains(description) {
                seen_errors.push(*description);
                candidates.push(Candidate::Error(ErrorCandidate {
                    name: (*phrase).to_string(),
                    confidence: 0.8,
                    code: None,
                    description: (*description).to_string(),
                }));
            }
        }
        for token in &tokens {
            let lower = token.to_lowercase();
            if lower.starts_with("0x") && lower.len() > 3 && lower[2..].chars().all(|c| c.is_ascii_hexdigit()) {
                candidates.push(Candidate::Error(ErrorCandidate {
                    name: token.to_uppercase().replacen("0X", "0x", 1),
                    confidence: 0.75,
                    code: Some(token.clone()),
                    description: "Error code reported in ticket".to_string(),
                }));
            }
        }

        if let Some(solution) = detect_solution(text) {
            candidates.push(Candidate::Solution(solution));
        }

        for (phrase, entity_type, display) in CONTEXT_TERMS {
            if contains_phrase(&normalized, phrase) {
                candidates.push(Candidate::Context(ContextCandidate {
                    name: (*display).to_string(),
                    confidence: 0.7,
                    entity_type: *entity_type,
                    description: String::new(),
                }));
            }
        }

        ExtractionPayload { candidates }
    }
}

#[async_trait]
impl ExtractionCollaborator for HeuristicExtractionCollaborator {
    fn name(&self) -> &'static str {
        "heuristic_extraction"
    }

    async fn extract(&self, ticket: &TicketInput) -> Result<String> {
        let payload = self.extract_payload(&ticket.description);
        serde_json::to_string(&payload)
            .map_err(|e| Error::Other(format!("Failed to encode heuristic payload: {}", e)))
    }
}

/// Known brands, lowercase key and display form
const BRANDS: &[(&str, &str)] = &[
    ("dell", "Dell"),
    ("hp", "HP"),
    ("lenovo", "Lenovo"),
    ("asus", "Asus"),
    ("acer", "Acer"),
    ("apple", "Apple"),
    ("samsung", "Samsung"),
    ("canon", "Canon"),
    ("epson", "Epson"),
    ("brother", "Brother"),
    ("microsoft", "Microsoft"),
    ("cisco", "Cisco"),
    ("logitech", "Logitech"),
    ("toshiba", "Toshiba"),
    ("xerox", "Xerox"),
    ("ricoh", "Ricoh"),
    ("netgear", "Netgear"),
];

/// Generic device words, used when no model follows the brand
const DEVICE_WORDS: &[(&str, &str)] = &[
    ("ordinateur portable", "ordinateur portable"),
    ("portable", "ordinateur portable"),
    ("laptop", "laptop"),
    ("imprimante", "imprimante"),
    ("printer", "printer"),
    ("routeur", "routeur"),
    ("router", "router"),
    ("serveur", "serveur"),
    ("server", "server"),
    ("moniteur", "moniteur"),
    ("monitor", "monitor"),
    ("scanner", "scanner"),
    ("téléphone", "téléphone"),
];

/// Error phrases and a short English gloss
const ERROR_PHRASES: &[(&str, &str)] = &[
    ("écran bleu", "Blue screen crash"),
    ("blue screen", "Blue screen crash"),
    ("bsod", "Blue screen crash"),
    ("écran noir", "No display output"),
    ("black screen", "No display output"),
    ("ne démarre pas", "Device does not boot"),
    ("won t boot", "Device does not boot"),
    ("bourrage papier", "Paper jam"),
    ("paper jam", "Paper jam"),
    ("pas de connexion", "No network connectivity"),
    ("no internet", "No network connectivity"),
    ("surchauffe", "Overheating"),
    ("overheating", "Overheating"),
    ("plantage", "Application or system crash"),
    ("crash", "Application or system crash"),
    ("très lent", "Severe slowness"),
    ("mot de passe oublié", "Forgotten password"),
    ("batterie ne charge pas", "Battery not charging"),
];

/// Context phrases with their type and display name
const CONTEXT_TERMS: &[(&str, EntityType, &str)] = &[
    ("windows 10", EntityType::Os, "Windows 10"),
    ("windows 11", EntityType::Os, "Windows 11"),
    ("macos", EntityType::Os, "macOS"),
    ("ubuntu", EntityType::Os, "Ubuntu"),
    ("outlook", EntityType::Software, "Outlook"),
    ("excel", EntityType::Software, "Excel"),
    ("teams", EntityType::Software, "Teams"),
    ("vpn", EntityType::Software, "VPN"),
    ("ram", EntityType::Component, "RAM"),
    ("disque dur", EntityType::Component, "disque dur"),
    ("ssd", EntityType::Component, "SSD"),
    ("carte graphique", EntityType::Component, "carte graphique"),
    ("clavier", EntityType::Component, "clavier"),
    ("au démarrage", EntityType::Symptom, "au démarrage"),
    ("at boot", EntityType::Symptom, "at boot"),
];

const SOLUTION_MARKERS: &[&str] = &[
    "résolu en",
    "résolu par",
    "solution :",
    "solution:",
    "fixed by",
    "resolved by",
];

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn contains_phrase(normalized: &str, phrase: &str) -> bool {
    normalized.contains(&format!(" {} ", phrase))
}

fn is_model_token(token: &str) -> bool {
    let lower = token.to_lowercase();
    if BRANDS.iter().any(|(key, _)| *key == lower) {
        return false;
    }
    let starts_upper = token.chars().next().is_some_and(char::is_uppercase);
    let has_digit = token.chars().any(|c| c.is_ascii_digit());
    starts_upper || has_digit
}

fn detect_equipment(tokens: &[String], lowered: &[String], normalized: &str) -> Vec<Candidate> {
    let device_word = DEVICE_WORDS
        .iter()
        .find(|(phrase, _)| contains_phrase(normalized, phrase))
        .map(|(_, display)| *display);

    let mut found = Vec::new();
    for (i, lower) in lowered.iter().enumerate() {
        let Some((_, brand)) = BRANDS.iter().find(|(key, _)| key == lower) else {
            continue;
        };

        let model: Vec<&str> = tokens[i + 1..]
            .iter()
            .take_while(|t| is_model_token(t))
            .take(3)
            .map(String::as_str)
            .collect();

        let (name, model, confidence) = if !model.is_empty() {
            let model = model.join(" ");
            (format!("{} {}", brand, model), Some(model), 0.85)
        } else if let Some(device) = device_word {
            (format!("{} {}", brand, device), None, 0.7)
        } else {
            continue;
        };

        if found
            .iter()
            .any(|c: &Candidate| c.name().eq_ignore_ascii_case(&name))
        {
            continue;
        }
        found.push(Candidate::Equipment(EquipmentCandidate {
            name,
            confidence,
            brand: Some((*brand).to_string()),
            model,
            description: String::new(),
        }));
    }

    if found.is_empty() {
        if let Some(device) = device_word {
            found.push(Candidate::Equipment(EquipmentCandidate {
                name: device.to_string(),
                confidence: 0.6,
                brand: None,
                model: None,
                description: String::new(),
            }));
        }
    }
    found
}

/// Lowercase `text`, recording for each output byte where its source char
/// ends in `text`
fn lowercase_with_offsets(text: &str) -> (String, Vec<usize>) {
    let mut lower = String::with_capacity(text.len());
    let mut source_end = Vec::with_capacity(text.len());
    for (start, ch) in text.char_indices() {
        let end = start + ch.len_utf8();
        for lc in ch.to_lowercase() {
            lower.push(lc);
            source_end.extend(std::iter::repeat_n(end, lc.len_utf8()));
        }
    }
    (lower, source_end)
}

fn detect_solution(text: &str) -> Option<SolutionCandidate> {
    let (lower, source_end) = lowercase_with_offsets(text);
    for marker in SOLUTION_MARKERS {
        let Some(pos) = lower.find(marker) else {
            continue;
        };
        // Case mapping may change byte lengths; slice `text` at the end of
        // the char that produced the marker's last byte.
        let rest = &text[source_end[pos + marker.len() - 1]..];
        let clause = rest.split(['.', '\n']).next().unwrap_or_default().trim();
        if clause.is_empty() {
            continue;
        }
        let steps: Vec<String> = clause
            .split(" puis ")
            .flat_map(|s| s.split(" then "))
            .map(|s| s.trim().trim_matches(',').trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        return Some(SolutionCandidate {
            name: clause.to_string(),
            confidence: 0.7,
            steps: if steps.len() > 1 { steps } else { Vec::new() },
            description: String::new(),
        });
    }
    None
}
