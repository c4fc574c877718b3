use anyhow::{Context, Result};
use cap_std::ambient_authority;
use cap_std::fs::Dir;
use std::path::Path;

const SKILLS_DIR: &str = "skills";
const SKILL_FILE: &str = "SKILL.md";

#[derive(Debug, Clone)]
pub struct SkillInfo {
    pub name: String,
    pub description: String,
}

/// Skills stored at `skills/<name>/SKILL.md` under the workspace.
///
/// Each skill is a markdown file with a small frontmatter block carrying
/// its name and description; the body is free-form instructions the
/// agent loads on demand. Like the filesystem tool, all access goes
/// through an anchored directory handle, so a hostile skill name cannot
/// reach outside the workspace even before the explicit name check.
pub struct SkillManager {
    root: Dir,
}

impl SkillManager {
    pub fn open(workspace: impl AsRef<Path>) -> Result<Self> {
        let workspace = workspace.as_ref();
        std::fs::create_dir_all(workspace).with_context(|| {
            format!("Failed to create workspace directory: {}", workspace.display())
        })?;
        let root = Dir::open_ambient_dir(workspace, ambient_authority())
            .with_context(|| format!("Failed to open workspace root: {}", workspace.display()))?;
        Ok(Self { root })
    }

    /// Skill names are a single path segment: letters, digits, `_`, `-`.
    fn validate_name(name: &str) -> Result<()> {
        if name.is_empty() {
            anyhow::bail!("skill name must not be empty");
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            anyhow::bail!(
                "invalid skill name '{}' (use letters, digits, '_' and '-')",
                name
            );
        }
        Ok(())
    }

    fn skill_file(name: &str) -> String {
        format!("{}/{}/{}", SKILLS_DIR, name, SKILL_FILE)
    }

    /// Write `skills/<name>/SKILL.md` with frontmatter and body.
    /// An existing skill of the same name is replaced.
    pub fn create_skill(&self, name: &str, description: &str, content: &str) -> Result<()> {
        Self::validate_name(name)?;
        self.root
            .create_dir_all(format!("{}/{}", SKILLS_DIR, name))
            .with_context(|| format!("cannot create skill directory for '{}'", name))?;
        let doc = format!(
            "---\nname: {}\ndescription: {}\n---\n\n{}\n",
            name,
            description,
            content.trim_end()
        );
        self.root
            .write(Self::skill_file(name), doc.as_bytes())
            .with_context(|| format!("cannot write skill '{}'", name))?;
        Ok(())
    }

    /// All installed skills with their frontmatter descriptions, sorted
    /// by name. Directories without a SKILL.md are ignored.
    pub fn list_skills(&self) -> Result<Vec<SkillInfo>> {
        let entries = match self.root.read_dir(SKILLS_DIR) {
            Ok(entries) => entries,
            Err(_) => return Ok(Vec::new()), // no skills directory yet
        };

        let mut skills = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            let Ok(content) = self.root.read_to_string(Self::skill_file(&name)) else {
                continue;
            };
            skills.push(SkillInfo {
                description: frontmatter_description(&content).unwrap_or_default(),
                name,
            });
        }
        skills.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(skills)
    }

    /// Full SKILL.md content, frontmatter included.
    pub fn get_skill(&self, name: &str) -> Result<String> {
        Self::validate_name(name)?;
        self.root
            .read_to_string(Self::skill_file(name))
            .map_err(|_| anyhow::anyhow!("skill not found: {}", name))
    }

    /// Remove the skill's whole directory.
    pub fn delete_skill(&self, name: &str) -> Result<()> {
        Self::validate_name(name)?;
        let dir = format!("{}/{}", SKILLS_DIR, name);
        if !self.root.exists(&dir) {
            anyhow::bail!("skill not found: {}", name);
        }
        self.root
            .remove_dir_all(&dir)
            .with_context(|| format!("cannot delete skill '{}'", name))?;
        Ok(())
    }
}

/// Pull the `description:` line out of a `---`-delimited frontmatter
/// block. Returns `None` for files without frontmatter.
pub fn frontmatter_description(content: &str) -> Option<String> {
    let rest = content.strip_prefix("---")?;
    let end = rest.find("\n---")?;
    for line in rest[..end].lines() {
        if let Some(value) = line.trim().strip_prefix("description:") {
            return Some(value.trim().to_string());
        }
    }
    None
}

/// Strip the frontmatter block, leaving only the skill body.
pub fn strip_frontmatter(content: &str) -> String {
    if let Some(rest) = content.strip_prefix("---") {
        if let Some(end) = rest.find("\n---\n") {
            return rest[end + 5..].trim().to_string();
        }
    }
    content.to_string()
}

#[cfg(test)]
mod tests;
