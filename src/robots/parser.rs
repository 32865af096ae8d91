//! Minimal robots.txt parser and rule evaluator.
//!
//! Supports user-agent groups, Allow/Disallow directives, `*` wildcards in
//! paths, and `$` end anchors. Evaluation follows the common longest-match
//! rule: the most specific matching directive wins; on equal length, Allow
//! wins. A path matched by no directive is allowed.

/// One Allow/Disallow line.
#[derive(Debug, Clone)]
struct Rule {
    allow: bool,
    path: String,
}

/// A user-agent group and its rules.
#[derive(Debug, Clone)]
struct Group {
    agents: Vec<String>,
    rules: Vec<Rule>,
}

/// Parsed robots.txt policy.
#[derive(Debug, Clone, Default)]
pub struct RobotsPolicy {
    groups: Vec<Group>,
}

impl RobotsPolicy {
    pub fn parse(text: &str) -> Self {
        let mut groups: Vec<Group> = Vec::new();
        let mut current: Option<Group> = None;
        // Consecutive user-agent lines share one group.
        let mut in_agent_run = false;

        for raw_line in text.lines() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((field, value)) = line.split_once(':') else {
                continue;
            };
            let field = field.trim().to_ascii_lowercase();
            let value = value.trim();

            match field.as_str() {
                "user-agent" => {
                    if !in_agent_run {
                        if let Some(group) = current.take() {
                            groups.push(group);
                        }
                        current = Some(Group {
                            agents: Vec::new(),
                            rules: Vec::new(),
                        });
                    }
                    if let Some(group) = current.as_mut() {
                        group.agents.push(value.to_ascii_lowercase());
                    }
                    in_agent_run = true;
                }
                "allow" | "disallow" => {
                    in_agent_run = false;
                    if let Some(group) = current.as_mut() {
                        // An empty Disallow means "allow everything"; it
                        // carries no restriction, so we can skip it.
                        if !value.is_empty() {
                            group.rules.push(Rule {
                                allow: field == "allow",
                                path: value.to_string(),
                            });
                        }
                    }
                }
                // crawl-delay, sitemap, etc. are irrelevant to consent
                _ => {
                    in_agent_run = false;
                }
            }
        }
        if let Some(group) = current.take() {
            groups.push(group);
        }

        Self { groups }
    }

    /// Decide whether `agent` may access `path`.
    pub fn is_allowed(&self, agent: &str, path: &str) -> bool {
        let path = if path.is_empty() { "/" } else { path };
        let Some(group) = self.group_for(agent) else {
            return true;
        };

        let mut verdict = true;
        let mut best_len = 0usize;
        for rule in &group.rules {
            if path_matches(&rule.path, path) {
                let len = rule.path.len();
                if len > best_len || (len == best_len && rule.allow) {
                    best_len = len;
                    verdict = rule.allow;
                }
            }
        }
        verdict
    }

    /// Pick the group whose agent token most specifically matches us,
    /// falling back to the `*` group.
    fn group_for(&self, agent: &str) -> Option<&Group> {
        let agent = agent.to_ascii_lowercase();
        let mut best: Option<(&Group, usize)> = None;
        for group in &self.groups {
            for token in &group.agents {
                let specificity = if token == "*" {
                    0
                } else if agent.contains(token.as_str()) {
                    token.len()
                } else {
                    continue;
                };
                if best.map_or(true, |(_, b)| specificity > b) {
                    best = Some((group, specificity));
                }
            }
        }
        best.map(|(g, _)| g)
    }
}

/// Prefix match with `*` wildcards; a trailing `$` anchors the end.
fn path_matches(pattern: &str, path: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };

    let parts: Vec<&str> = pattern.split('*').collect();
    let mut pos = 0usize;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            if !path[pos..].starts_with(part) {
                return false;
            }
            pos += part.len();
        } else {
            match path[pos..].find(part) {
                Some(idx) => pos += idx + part.len(),
                None => return false,
            }
        }
    }

    if anchored {
        // The last literal part must reach the end (a trailing `*` before
        // `$` matches anything, so the anchor is trivially satisfied).
        if pattern.ends_with('*') {
            true
        } else {
            pos == path.len()
        }
    } else {
        true
    }
}
