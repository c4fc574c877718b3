use super::*;

fn manager() -> (tempfile::TempDir, SkillManager) {
    let dir = tempfile::tempdir().unwrap();
    let mgr = SkillManager::open(dir.path()).unwrap();
    (dir, mgr)
}

#[test]
fn test_create_skill_writes_frontmatter_and_body() {
    let (dir, mgr) = manager();
    mgr.create_skill("test-skill", "Test description", "# Test\n\nTest content")
        .unwrap();

    let content =
        std::fs::read_to_string(dir.path().join("skills/test-skill/SKILL.md")).unwrap();
    assert!(content.contains("name: test-skill"));
    assert!(content.contains("description: Test description"));
    assert!(content.contains("Test content"));
}

#[test]
fn test_list_skills_returns_all_sorted() {
    let (_dir, mgr) = manager();
    mgr.create_skill("zeta", "Last", "z").unwrap();
    mgr.create_skill("alpha", "First", "a").unwrap();

    let skills = mgr.list_skills().unwrap();
    assert_eq!(skills.len(), 2);
    assert_eq!(skills[0].name, "alpha");
    assert_eq!(skills[0].description, "First");
    assert_eq!(skills[1].name, "zeta");
}

#[test]
fn test_list_skills_empty_workspace() {
    let (_dir, mgr) = manager();
    assert!(mgr.list_skills().unwrap().is_empty());
}

#[test]
fn test_list_skills_skips_dirs_without_skill_file() {
    let (dir, mgr) = manager();
    std::fs::create_dir_all(dir.path().join("skills/not-a-skill")).unwrap();
    mgr.create_skill("real", "d", "c").unwrap();

    let skills = mgr.list_skills().unwrap();
    assert_eq!(skills.len(), 1);
    assert_eq!(skills[0].name, "real");
}

#[test]
fn test_get_skill_round_trip() {
    let (_dir, mgr) = manager();
    mgr.create_skill("test-skill", "d", "# Test\n\nTest content")
        .unwrap();

    let content = mgr.get_skill("test-skill").unwrap();
    assert!(content.contains("Test content"));

    let err = mgr.get_skill("nonexistent").unwrap_err();
    assert!(err.to_string().contains("skill not found"));
}

#[test]
fn test_delete_skill_removes_directory() {
    let (dir, mgr) = manager();
    mgr.create_skill("test-skill", "d", "content").unwrap();

    mgr.delete_skill("test-skill").unwrap();
    assert!(!dir.path().join("skills/test-skill").exists());

    let err = mgr.delete_skill("test-skill").unwrap_err();
    assert!(err.to_string().contains("skill not found"));
}

#[test]
fn test_create_overwrites_existing() {
    let (_dir, mgr) = manager();
    mgr.create_skill("s", "old", "old body").unwrap();
    mgr.create_skill("s", "new", "new body").unwrap();

    let content = mgr.get_skill("s").unwrap();
    assert!(content.contains("new body"));
    assert!(!content.contains("old body"));
}

#[test]
fn test_hostile_names_rejected() {
    let (_dir, mgr) = manager();
    for name in ["", "../escape", "a/b", "a b", "."] {
        assert!(mgr.create_skill(name, "d", "c").is_err(), "accepted {:?}", name);
        assert!(mgr.get_skill(name).is_err());
        assert!(mgr.delete_skill(name).is_err());
    }
}

#[test]
fn test_frontmatter_description() {
    let content = "---\nname: x\ndescription: a test skill\n---\n\nBody";
    assert_eq!(
        frontmatter_description(content).as_deref(),
        Some("a test skill")
    );
    assert_eq!(frontmatter_description("no frontmatter"), None);
    assert_eq!(frontmatter_description("---\nname: x\n---\n\nBody"), None);
}

#[test]
fn test_strip_frontmatter() {
    let content = "---\nname: test\ndescription: d\n---\n\nSkill body here.";
    assert_eq!(strip_frontmatter(content), "Skill body here.");
    assert_eq!(strip_frontmatter("plain content"), "plain content");
    // Unterminated frontmatter is left as-is
    let broken = "---\nname: test\nno closing delimiter";
    assert_eq!(strip_frontmatter(broken), broken);
}
