use super::parse::extract_json_payload;
use super::types::{RiskCategory, SecurityAssessment, SecurityGrade, SecurityIssue, Severity};
use crate::error::{EvalError, SecurityError};
use crate::provider::{CompletionRequest, ModelClient, RateLimiter, RetryPolicy, with_retry};
use crate::skills::SkillRecord;
use chrono::Utc;
use std::sync::Arc;

/// Analyzes raw skill content against a fixed set of risk categories with
/// a single model call. A failed call surfaces as an error; it never
/// defaults to `secure`.
pub struct SecurityAnalyzer {
    client: Arc<dyn ModelClient>,
    limiter: Arc<RateLimiter>,
    model: String,
    retry: RetryPolicy,
    max_tokens: u32,
}

impl SecurityAnalyzer {
    pub fn new(
        client: Arc<dyn ModelClient>,
        limiter: Arc<RateLimiter>,
        model: impl Into<String>,
        retry: RetryPolicy,
        max_tokens: u32,
    ) -> Self {
        Self {
            client,
            limiter,
            model: model.into(),
            retry,
            max_tokens,
        }
    }

    pub async fn analyze(&self, skill: &SkillRecord) -> Result<SecurityAssessment, EvalError> {
        let request = CompletionRequest::new(&self.model, build_security_prompt(&skill.content))
            .with_max_tokens(self.max_tokens);

        let request = &request;
        let completion = with_retry(&self.retry, "security analysis", || async move {
            let _permit = self.limiter.acquire().await;
            self.client.complete(request).await
        })
        .await
        .map_err(SecurityError::Call)?;

        let (issues, analysis) = parse_assessment(&completion.text)?;
        let grade = grade_for(&issues);

        Ok(SecurityAssessment {
            skill_id: skill.id.clone(),
            grade,
            issues,
            analysis,
            model: completion.model,
            analyzed_at: Utc::now(),
        })
    }
}

/// The grade is the maximum severity among identified issues - not an
/// average, not a count threshold. No issues means `secure`.
pub fn grade_for(issues: &[SecurityIssue]) -> SecurityGrade {
    match issues.iter().map(|issue| issue.severity).max() {
        Some(Severity::High) => SecurityGrade::Fail,
        Some(Severity::Medium) => SecurityGrade::Warning,
        Some(Severity::Low) | None => SecurityGrade::Secure,
    }
}

fn build_security_prompt(skill_content: &str) -> String {
    format!(
        r#"You are a security analyst reviewing a skill file that extends an AI coding assistant.

Analyze the following skill content for security risks. Check for these risk categories:

1. **data_exfiltration**: external URLs, webhooks, or patterns that send user data outside the local system
2. **filesystem_abuse**: dangerous file operations - arbitrary paths (especially /etc, ~/.ssh), deletion, reading sensitive files
3. **credential_exposure**: attempts to access or leak credentials - environment variables, API keys, .env files
4. **code_injection**: dynamic code execution patterns - eval, exec, constructing code from user input
5. **malicious_dependencies**: suspicious package names (typosquatting, unusual sources)

SKILL CONTENT TO ANALYZE:
---
{skill_content}
---

For each issue found, classify its severity:
- **high**: immediate security risk, data could be exfiltrated or the system compromised
- **medium**: potential risk that warrants user awareness
- **low**: minor concern, legitimate use case but worth noting

Return your analysis as JSON with this exact format:
{{
    "issues": [
        {{
            "category": "category_name",
            "severity": "low|medium|high",
            "description": "human-readable description of the issue",
            "evidence": "the specific code/text that triggered this concern"
        }}
    ],
    "analysis": "overall summary explaining your findings"
}}

If no issues are found, return an empty issues array with an analysis explaining why the skill is safe.

Return ONLY the JSON, no additional text."#
    )
}

fn parse_assessment(text: &str) -> Result<(Vec<SecurityIssue>, String), SecurityError> {
    let payload = extract_json_payload(text)
        .ok_or_else(|| SecurityError::Parse("no JSON object in security output".into()))?;
    let value: serde_json::Value =
        serde_json::from_str(payload).map_err(|e| SecurityError::Parse(e.to_string()))?;

    let raw_issues = value
        .get("issues")
        .and_then(|v| v.as_array())
        .ok_or_else(|| SecurityError::Parse("missing 'issues' array".into()))?;

    let mut issues = Vec::with_capacity(raw_issues.len());
    for raw in raw_issues {
        let description = raw
            .get("description")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SecurityError::Parse("issue missing 'description'".into()))?
            .to_string();
        let evidence = raw
            .get("evidence")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        issues.push(SecurityIssue {
            category: parse_category(raw.get("category").and_then(|v| v.as_str())),
            severity: parse_severity(raw.get("severity").and_then(|v| v.as_str())),
            description,
            evidence,
        });
    }

    let analysis = value
        .get("analysis")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    Ok((issues, analysis))
}

fn parse_category(raw: Option<&str>) -> RiskCategory {
    match raw.map(str::trim) {
        Some("data_exfiltration") => RiskCategory::DataExfiltration,
        Some("filesystem_abuse" | "file_system_abuse") => RiskCategory::FilesystemAbuse,
        Some("credential_exposure" | "credential_theft") => RiskCategory::CredentialExposure,
        Some("code_injection") => RiskCategory::CodeInjection,
        Some("malicious_dependencies") => RiskCategory::MaliciousDependencies,
        _ => RiskCategory::Other,
    }
}

/// An unrecognized severity stays low rather than inflating the grade.
fn parse_severity(raw: Option<&str>) -> Severity {
    match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        Some("high") => Severity::High,
        Some("medium") => Severity::Medium,
        _ => Severity::Low,
    }
}
