//! Skill discovery. Skills are Markdown documents with a small YAML
//! frontmatter under `{workspace}/skills/<name>/SKILL.md`. The runtime
//! does not execute skills — `always`-flagged ones are injected into the
//! system prompt in full and the rest are summarized in an XML listing.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// A skill parsed from a SKILL.md file.
#[derive(Debug, Clone)]
pub struct Skill {
    pub name: String,
    pub description: String,
    /// Injected into every system prompt when set.
    pub always: bool,
    pub body: String,
    pub path: PathBuf,
}

/// All skills discovered in a workspace.
#[derive(Debug, Default)]
pub struct SkillSet {
    skills: Vec<Skill>,
}

impl SkillSet {
    /// Scan `{workspace}/skills/*/SKILL.md`. Unparseable files are skipped.
    pub fn discover(workspace: &Path) -> Self {
        let skills_dir = workspace.join("skills");
        let mut skills = Vec::new();

        let Ok(entries) = std::fs::read_dir(&skills_dir) else {
            debug!(?skills_dir, "no skills directory");
            return Self { skills };
        };

        for entry in entries.flatten() {
            let skill_md = entry.path().join("SKILL.md");
            if !skill_md.is_file() {
                continue;
            }
            match std::fs::read_to_string(&skill_md) {
                Ok(content) => match parse_skill(&content, &skill_md) {
                    Some(skill) => skills.push(skill),
                    None => warn!(?skill_md, "skill has no valid frontmatter — skipping"),
                },
                Err(e) => warn!(?skill_md, error = %e, "failed to read skill"),
            }
        }

        skills.sort_by(|a, b| a.name.cmp(&b.name));
        Self { skills }
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    pub fn all(&self) -> &[Skill] {
        &self.skills
    }

    /// Union of `always`-flagged skills and the explicitly requested names.
    pub fn active(&self, requested: &[String]) -> Vec<&Skill> {
        self.skills
            .iter()
            .filter(|s| s.always || requested.iter().any(|r| r == &s.name))
            .collect()
    }

    /// XML listing of every discovered skill for the system prompt.
    pub fn summary_xml(&self) -> Option<String> {
        if self.skills.is_empty() {
            return None;
        }
        let mut out = String::from("<skills>\n");
        for skill in &self.skills {
            out.push_str(&format!(
                "<skill available=\"true\">\n  <name>{}</name>\n  <description>{}</description>\n  <location>{}</location>\n</skill>\n",
                skill.name,
                skill.description,
                skill.path.display(),
            ));
        }
        out.push_str("</skills>");
        Some(out)
    }
}

/// Parse a SKILL.md: `---` delimited `key: value` frontmatter, Markdown
/// body. Requires at least a name.
fn parse_skill(content: &str, path: &Path) -> Option<Skill> {
    let trimmed = content.trim_start();
    if !trimmed.starts_with("---") {
        return None;
    }
    let after_open = &trimmed[3..];
    let end = after_open.find("\n---")?;
    let frontmatter = &after_open[..end];
    let body = after_open[end + 4..].trim().to_string();

    let mut name = String::new();
    let mut description = String::new();
    let mut always = false;

    for line in frontmatter.lines() {
        let line = line.trim();
        if let Some((key, value)) = line.split_once(':') {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            match key.trim() {
                "name" => name = value.to_string(),
                "description" => description = value.to_string(),
                "always" => always = value.eq_ignore_ascii_case("true"),
                _ => {}
            }
        }
    }

    if name.is_empty() {
        return None;
    }
    Some(Skill {
        name,
        description,
        always,
        body,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_skill(dir: &Path, name: &str, frontmatter_extra: &str, body: &str) {
        let skill_dir = dir.join("skills").join(name);
        std::fs::create_dir_all(&skill_dir).unwrap();
        std::fs::write(
            skill_dir.join("SKILL.md"),
            format!(
                "---\nname: {name}\ndescription: {name} description\n{frontmatter_extra}---\n\n{body}"
            ),
        )
        .unwrap();
    }

    #[test]
    fn discovery_and_activation() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(dir.path(), "github", "", "Use gh for everything.");
        write_skill(dir.path(), "notes", "always: true\n", "Keep notes tidy.");

        let skills = SkillSet::discover(dir.path());
        assert_eq!(skills.all().len(), 2);

        let active = skills.active(&[]);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "notes");

        let active = skills.active(&["github".to_string()]);
        assert_eq!(active.len(), 2);
    }

    #[test]
    fn summary_xml_lists_every_skill() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(dir.path(), "deploy", "", "Deploy steps.");
        let skills = SkillSet::discover(dir.path());
        let xml = skills.summary_xml().unwrap();
        assert!(xml.contains("<skill available=\"true\">"));
        assert!(xml.contains("<name>deploy</name>"));
        assert!(xml.contains("<description>deploy description</description>"));
        assert!(xml.contains("SKILL.md</location>"));
    }

    #[test]
    fn invalid_skills_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("skills").join("broken");
        std::fs::create_dir_all(&bad).unwrap();
        std::fs::write(bad.join("SKILL.md"), "no frontmatter here").unwrap();
        write_skill(dir.path(), "good", "", "body");

        let skills = SkillSet::discover(dir.path());
        assert_eq!(skills.all().len(), 1);
        assert_eq!(skills.all()[0].name, "good");
    }

    #[test]
    fn missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let skills = SkillSet::discover(dir.path());
        assert!(skills.is_empty());
        assert!(skills.summary_xml().is_none());
    }
}
