use std::collections::BTreeMap;

use regex::{Captures, Regex};

const BUILTIN: &[(&str, &str)] = &[
	("MFA", "Multi-Factor Authentication"),
	("2FA", "Two-Factor Authentication"),
	("SSO", "Single Sign-On"),
	("GDPR", "General Data Protection Regulation"),
	("PCI DSS", "Payment Card Industry Data Security Standard"),
	("SOC 2", "Service Organization Control 2"),
	("ISO", "International Organization for Standardization"),
	("NIST", "National Institute of Standards and Technology"),
	("RBAC", "Role-Based Access Control"),
	("IAM", "Identity and Access Management"),
	("VPN", "Virtual Private Network"),
	("API", "Application Programming Interface"),
	("SQL", "Structured Query Language"),
	("XSS", "Cross-Site Scripting"),
	("CSRF", "Cross-Site Request Forgery"),
	("DDoS", "Distributed Denial of Service"),
	("WAF", "Web Application Firewall"),
	("IDS", "Intrusion Detection System"),
	("IPS", "Intrusion Prevention System"),
	("SIEM", "Security Information and Event Management"),
	("PKI", "Public Key Infrastructure"),
	("CA", "Certificate Authority"),
	("TLS", "Transport Layer Security"),
	("SSL", "Secure Sockets Layer"),
	("HTTPS", "Hypertext Transfer Protocol Secure"),
	("DNS", "Domain Name System"),
	("DNSSEC", "Domain Name System Security Extensions"),
	("DLP", "Data Loss Prevention"),
	("EDR", "Endpoint Detection and Response"),
	("MDM", "Mobile Device Management"),
	("BYOD", "Bring Your Own Device"),
	("RTO", "Recovery Time Objective"),
	("RPO", "Recovery Point Objective"),
	("BCP", "Business Continuity Plan"),
	("DR", "Disaster Recovery"),
	("ISMS", "Information Security Management System"),
	("DPIA", "Data Protection Impact Assessment"),
	("DPO", "Data Protection Officer"),
	("PII", "Personally Identifiable Information"),
	("PHI", "Protected Health Information"),
	("HIPAA", "Health Insurance Portability and Accountability Act"),
	("SOX", "Sarbanes-Oxley Act"),
	("FERPA", "Family Educational Rights and Privacy Act"),
	("CCPA", "California Consumer Privacy Act"),
	("AES", "Advanced Encryption Standard"),
	("RSA", "Rivest-Shamir-Adleman"),
	("SHA", "Secure Hash Algorithm"),
	("OWASP", "Open Web Application Security Project"),
	("CVE", "Common Vulnerabilities and Exposures"),
	("CVSS", "Common Vulnerability Scoring System"),
];

/// Rewrites known abbreviations as `"<Full Form> (<ABBR>)"` before text is embedded.
///
/// Matching is whole-word and case-insensitive, and happens in a single pass so an expansion is
/// never expanded again.
#[derive(Debug, Clone)]
pub struct AbbreviationExpander {
	pattern: Option<Regex>,
	// Keyed by the lower-cased abbreviation.
	entries: BTreeMap<String, (String, String)>,
}
impl AbbreviationExpander {
	pub fn new<I, K, V>(extra: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: AsRef<str>,
		V: AsRef<str>,
	{
		let mut entries = BTreeMap::new();

		for (abbreviation, full_form) in BUILTIN {
			entries.insert(
				abbreviation.to_lowercase(),
				(abbreviation.to_string(), full_form.to_string()),
			);
		}
		for (abbreviation, full_form) in extra {
			let abbreviation = abbreviation.as_ref().trim();
			let full_form = full_form.as_ref().trim();

			if abbreviation.is_empty() || full_form.is_empty() {
				continue;
			}

			entries.insert(
				abbreviation.to_lowercase(),
				(abbreviation.to_string(), full_form.to_string()),
			);
		}

		let pattern =
			build_pattern(entries.values().map(|(abbreviation, _)| abbreviation.as_str()));

		Self { pattern, entries }
	}

	/// Expander that leaves text untouched.
	pub fn disabled() -> Self {
		Self { pattern: None, entries: BTreeMap::new() }
	}

	pub fn from_config(cfg: &qmatch_config::Normalization) -> Self {
		if !cfg.expand_abbreviations {
			return Self::disabled();
		}

		Self::new(&cfg.abbreviations)
	}

	pub fn expand(&self, text: &str) -> String {
		let Some(pattern) = self.pattern.as_ref() else {
			return text.to_string();
		};

		pattern
			.replace_all(text, |caps: &Captures<'_>| {
				let matched = &caps[0];

				match self.entries.get(&matched.to_lowercase()) {
					Some((abbreviation, full_form)) => format!("{full_form} ({abbreviation})"),
					None => matched.to_string(),
				}
			})
			.into_owned()
	}
}
impl Default for AbbreviationExpander {
	fn default() -> Self {
		Self::new(std::iter::empty::<(&str, &str)>())
	}
}

fn build_pattern<'a, I>(abbreviations: I) -> Option<Regex>
where
	I: Iterator<Item = &'a str>,
{
	let mut alternatives: Vec<&str> = abbreviations.collect();

	if alternatives.is_empty() {
		return None;
	}

	// Longest first so "DNSSEC" wins over "DNS" and "PCI DSS" over a bare prefix.
	alternatives.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

	let body: Vec<String> =
		alternatives.iter().map(|abbreviation| regex::escape(abbreviation)).collect();

	Regex::new(&format!(r"(?i)\b(?:{})\b", body.join("|"))).ok()
}
