use super::*;

fn skills() -> (tempfile::TempDir, Arc<SkillManager>) {
    let dir = tempfile::tempdir().unwrap();
    let mgr = Arc::new(SkillManager::open(dir.path()).unwrap());
    (dir, mgr)
}

#[tokio::test]
async fn test_create_skill_tool() {
    let (dir, mgr) = skills();
    let tool = CreateSkillTool::new(mgr);

    let out = tool
        .execute(serde_json::json!({
            "name": "test-skill",
            "description": "Test description",
            "content": "# Test Content"
        }))
        .await
        .unwrap();
    assert!(out.contains("created successfully"));
    assert!(dir.path().join("skills/test-skill/SKILL.md").exists());
}

#[tokio::test]
async fn test_create_skill_requires_name_and_content() {
    let (_dir, mgr) = skills();
    let tool = CreateSkillTool::new(mgr);

    assert!(tool
        .execute(serde_json::json!({"content": "x"}))
        .await
        .is_err());
    assert!(tool
        .execute(serde_json::json!({"name": "x"}))
        .await
        .is_err());
}

#[tokio::test]
async fn test_list_skills_tool() {
    let (_dir, mgr) = skills();
    mgr.create_skill("skill1", "Description 1", "Content 1").unwrap();
    mgr.create_skill("skill2", "Description 2", "Content 2").unwrap();

    let tool = ListSkillsTool::new(mgr);
    let out = tool.execute(serde_json::json!({})).await.unwrap();
    assert!(out.contains("skill1"));
    assert!(out.contains("Description 1"));
    assert!(out.contains("skill2"));
}

#[tokio::test]
async fn test_list_skills_tool_empty() {
    let (_dir, mgr) = skills();
    let tool = ListSkillsTool::new(mgr);
    let out = tool.execute(serde_json::json!({})).await.unwrap();
    assert_eq!(out, "No skills installed.");
}

#[tokio::test]
async fn test_read_skill_tool() {
    let (_dir, mgr) = skills();
    mgr.create_skill("test-skill", "d", "# Test Content").unwrap();

    let tool = ReadSkillTool::new(mgr);
    let out = tool
        .execute(serde_json::json!({"name": "test-skill"}))
        .await
        .unwrap();
    assert!(out.contains("Test Content"));

    let err = tool
        .execute(serde_json::json!({"name": "missing"}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("skill not found"));
}

#[tokio::test]
async fn test_delete_skill_tool() {
    let (dir, mgr) = skills();
    mgr.create_skill("test-skill", "d", "Content").unwrap();

    let tool = DeleteSkillTool::new(mgr);
    let out = tool
        .execute(serde_json::json!({"name": "test-skill"}))
        .await
        .unwrap();
    assert!(out.contains("deleted successfully"));
    assert!(!dir.path().join("skills/test-skill").exists());

    // Deleting again reports the missing skill as a tool error.
    let err = tool
        .execute(serde_json::json!({"name": "test-skill"}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("skill not found"));
}
