//! 轮询同步演示
//!
//! 用法：
//!   cargo run --example poll_demo               # 连接 CHAT_SERVER_URL（默认 http://localhost:8080）
//!   cargo run --example poll_demo -- --mock     # 离线 mock 模式

use std::sync::Arc;
use std::time::Duration;

use chatsync_sdk::{KvPreferences, SyncConfig, SyncEngine};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let mock = std::env::args().any(|arg| arg == "--mock");
    let base_url = std::env::var("CHAT_SERVER_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());

    let config = SyncConfig::builder()
        .base_url(base_url)
        .poll_interval(Duration::from_millis(500))
        .mock_mode(mock)
        .build();

    let data_dir = std::env::temp_dir().join("chatsync-demo");
    let preferences = Arc::new(KvPreferences::open(&data_dir).await?);
    let engine = SyncEngine::from_config(config, preferences).await?;

    engine
        .on_messages_updated(|messages| {
            println!("\n📨 消息列表更新（{} 条）", messages.len());
            for message in messages {
                let marker = if message.is_complete { "" } else { " …" };
                println!(
                    "  [{}] {}: {}{}",
                    message.timestamp_formatted(),
                    message.author,
                    message.content,
                    marker
                );
            }
        })
        .await;
    engine.on_error(|error| eprintln!("❌ {}", error)).await;

    if engine.display_name().is_empty() {
        engine.set_display_name("demo").await?;
    }
    println!("👤 显示名: {}", engine.display_name());

    engine.start().await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    match engine.send_message("Hello from chatsync-sdk").await {
        Ok(message) => println!("✅ 已发送: {}", message.id),
        Err(e) => println!("⚠️ 发送失败: {}", e),
    }

    tokio::time::sleep(Duration::from_secs(3)).await;
    engine.shutdown().await;

    println!("\n✅ 演示结束，本地共 {} 条消息", engine.current_messages().await.len());
    Ok(())
}
