use super::*;

fn tool() -> (tempfile::TempDir, FilesystemTool) {
    let dir = tempfile::tempdir().unwrap();
    let tool = FilesystemTool::new(dir.path()).unwrap();
    (dir, tool)
}

#[tokio::test]
async fn test_write_then_read() {
    let (_dir, tool) = tool();
    let out = tool
        .execute(serde_json::json!({"action": "write", "path": "notes/a.txt", "content": "hello"}))
        .await
        .unwrap();
    assert_eq!(out, "written");

    let content = tool
        .execute(serde_json::json!({"action": "read", "path": "notes/a.txt"}))
        .await
        .unwrap();
    assert_eq!(content, "hello");
}

#[tokio::test]
async fn test_list_marks_directories() {
    let (_dir, tool) = tool();
    tool.execute(serde_json::json!({"action": "write", "path": "sub/file.txt", "content": "x"}))
        .await
        .unwrap();
    tool.execute(serde_json::json!({"action": "write", "path": "top.txt", "content": "y"}))
        .await
        .unwrap();

    let listing = tool
        .execute(serde_json::json!({"action": "list", "path": "."}))
        .await
        .unwrap();
    assert!(listing.contains("sub/\n"));
    assert!(listing.contains("top.txt\n"));
}

#[tokio::test]
async fn test_dotdot_traversal_rejected() {
    let (_dir, tool) = tool();
    let err = tool
        .execute(serde_json::json!({"action": "read", "path": "../outside.txt"}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("cannot read"));

    let err = tool
        .execute(
            serde_json::json!({"action": "write", "path": "../escape.txt", "content": "nope"}),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("cannot write"));
}

#[tokio::test]
async fn test_absolute_path_rejected() {
    let (_dir, tool) = tool();
    let result = tool
        .execute(serde_json::json!({"action": "read", "path": "/etc/passwd"}))
        .await;
    assert!(result.is_err());
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlink_escape_not_followed() {
    let dir = tempfile::tempdir().unwrap();
    let outside = tempfile::tempdir().unwrap();
    std::fs::write(outside.path().join("secret.txt"), "secret").unwrap();
    std::os::unix::fs::symlink(outside.path().join("secret.txt"), dir.path().join("link"))
        .unwrap();

    let tool = FilesystemTool::new(dir.path()).unwrap();
    let result = tool
        .execute(serde_json::json!({"action": "read", "path": "link"}))
        .await;
    assert!(result.is_err(), "symlink escaping the workspace must not be followed");
}

#[tokio::test]
async fn test_unknown_action() {
    let (_dir, tool) = tool();
    let err = tool
        .execute(serde_json::json!({"action": "delete", "path": "a"}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unknown action"));
}
