//! OOTD CLI 客户端（测试版）
//!
//! 非交互式 CLI，用于测试和展示 SDK 功能。
//! 通过命令行参数指定当前用户和本地数据库，每次执行一个子命令。

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ootd_sdk_core_rust::ootd::friend::FriendListener;
use ootd_sdk_core_rust::ootd::post::PostListener;
use ootd_sdk_core_rust::ootd::user::DEFAULT_SEARCH_LIMIT;
use ootd_sdk_core_rust::{ClientConfig, Location, OotdClient, Post, PostDraft, UserProfile};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

/// OOTD CLI 客户端
#[derive(Parser, Debug)]
#[command(name = "ootd-cli")]
#[command(about = "OOTD CLI 客户端 - 用于测试好友动态、发帖与实时订阅", long_about = None)]
struct Args {
    /// 本地数据库 URL
    #[arg(long, env = "OOTD_DB_URL", default_value = "sqlite://ootd.db?mode=rwc")]
    db: String,

    /// 当前用户 ID
    #[arg(short, long, env = "OOTD_USER_ID")]
    user: String,

    /// 单次查询超时（秒）
    #[arg(long, default_value = "5")]
    timeout: u64,

    /// 日志级别（默认: info,ootd_sdk_core_rust=debug）
    #[arg(long, default_value = "info,ootd_sdk_core_rust=debug")]
    log_level: String,

    /// 额外把日志写入该文件（追加模式）
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 保存自己的资料
    Profile {
        #[arg(long)]
        username: String,
        #[arg(long, default_value = "")]
        display_name: String,
        #[arg(long, default_value = "")]
        pic: String,
    },
    /// 按用户名前缀搜索用户
    Search {
        query: String,
        #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: u32,
    },
    /// 添加好友（对方也添加你之后才能互看动态）
    Befriend { uid: String },
    /// 删除好友
    Unfriend { uid: String },
    /// 列出好友、互为好友和待处理的好友请求
    Friends,
    /// 发布一条穿搭
    Post {
        #[arg(long, default_value = "")]
        description: String,
        /// 单品 ID，逗号分隔
        #[arg(long, value_delimiter = ',')]
        items: Vec<String>,
        #[arg(long, default_value = "")]
        outfit_url: String,
        #[arg(long)]
        location: Option<String>,
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        lng: f64,
    },
    /// 查看动态；不指定用户时显示自己和互为好友的动态
    Feed {
        uids: Vec<String>,
        /// 只看最近 24 小时（时间降序）
        #[arg(long)]
        recent: bool,
    },
    /// 实时订阅好友动态
    Watch {
        /// 运行时长（秒），0 表示持续运行直到 Ctrl+C
        #[arg(short, long, default_value = "0")]
        duration: u64,
    },
    /// 今天是否已经发过帖子
    PostedToday,
    /// 删除自己的帖子
    Delete { post_uid: String },
}

/// 初始化日志（输出到 stdout，可选同时写入文件）
fn init_logger(log_level: &str, log_file: Option<&PathBuf>) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // 优先使用环境变量 RUST_LOG（如果设置了），否则使用命令行参数
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(true);

    // 文件不需要颜色
    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("无法创建日志文件 {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(false)
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    if let Some(path) = log_file {
        info!("[CLI] 📝 日志已同时输出到控制台和文件: {}", path.display());
    }
    Ok(())
}

/// 设置监听器（输出所有回调）
fn setup_listeners(client: &mut OotdClient) {
    struct CliPostListener;
    #[async_trait::async_trait]
    impl PostListener for CliPostListener {
        async fn on_post_added(&self, post_json: String) {
            info!("[CLI/Post] 🆕 发布成功: {}", post_json);
        }

        async fn on_post_updated(&self, post_json: String) {
            info!("[CLI/Post] ✏️ 帖子已更新: {}", post_json);
        }

        async fn on_post_deleted(&self, post_uid: String) {
            info!("[CLI/Post] 🗑️ 帖子已删除: {}", post_uid);
        }
    }
    client.set_post_listener(Arc::new(CliPostListener));

    struct CliFriendListener;
    #[async_trait::async_trait]
    impl FriendListener for CliFriendListener {
        async fn on_friend_list_changed(&self, friends_json: String) {
            info!("[CLI/Friend] 👥 好友列表变更: {}", friends_json);
        }
    }
    client.set_friend_listener(Arc::new(CliFriendListener));
}

fn print_posts(posts: &[Post]) {
    info!("[CLI] 📋 动态（共 {} 条）:", posts.len());
    for post in posts {
        let when = chrono::DateTime::from_timestamp_millis(post.timestamp)
            .map(|dt| dt.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| post.timestamp.to_string());
        info!(
            "[CLI]   - {} | {} | {} | {} | 单品: {:?}",
            when,
            if post.name.is_empty() { &post.owner_id } else { &post.name },
            post.post_uid,
            post.description,
            post.items_id
        );
    }
}

async fn watch(client: &OotdClient, duration: u64) {
    let mut feed = client.observe_friend_feed().await;
    info!("[CLI] 📥 开始监听好友动态...");

    let deadline = async {
        if duration > 0 {
            info!("[CLI] ⏰ {} 秒后自动退出", duration);
            sleep(Duration::from_secs(duration)).await;
        } else {
            info!("[CLI] ⏰ 持续运行中，按 Ctrl+C 退出");
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("[CLI] 监听 Ctrl+C 失败: {}", e);
            }
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            next = feed.next_feed() => match next {
                Some(posts) => print_posts(&posts),
                None => {
                    warn!("[CLI] 订阅已结束");
                    break;
                }
            },
        }
    }
    feed.cancel();
    info!("[CLI] 👋 程序退出");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logger(&args.log_level, args.log_file.as_ref())?;

    info!("[CLI] 🚀 OOTD CLI 客户端（测试模式）");
    info!("[CLI] 👤 用户: {} | 数据库: {}", args.user, args.db);

    let mut config = ClientConfig::new(args.user.clone());
    config.db_url = args.db.clone();
    config.query_timeout = Duration::from_secs(args.timeout);

    let mut client = OotdClient::connect(config)
        .await
        .map_err(|e| anyhow::anyhow!("连接失败: {:#}", e))?;
    setup_listeners(&mut client);

    match args.command {
        Command::Profile {
            username,
            display_name,
            pic,
        } => {
            let mut profile = UserProfile::new(args.user.clone(), username);
            profile.display_name = display_name;
            profile.profile_pic_url = pic;
            let saved = client.users().save_profile(&profile).await?;
            info!("[CLI] ✅ 资料已保存: {} ({})", saved.shown_name(), saved.username);
        }
        Command::Search { query, limit } => {
            let users = client.users().search_users(&query, limit).await;
            info!("[CLI] 🔍 搜索 {:?}，共 {} 个结果:", query, users.len());
            for user in users {
                info!("[CLI]   - {} | @{} | {}", user.uid, user.username, user.shown_name());
            }
        }
        Command::Befriend { uid } => {
            client.friends().add_friend(&uid).await?;
            let relationship = client.friends().relationship_with(&uid).await?;
            info!("[CLI] ✅ 已添加 {}，当前关系: {:?}", uid, relationship);
        }
        Command::Unfriend { uid } => {
            client.friends().remove_friend(&uid).await?;
            info!("[CLI] ✅ 已删除好友 {}", uid);
        }
        Command::Friends => {
            let friends = client.friends().get_friends().await?;
            let mutual = client.friends().get_mutual_friend_ids().await?;
            let pending = client.friends().get_pending_requests().await?;
            info!("[CLI] 👥 我添加的好友（共 {} 个）:", friends.len());
            for edge in &friends {
                let mark = if mutual.contains(&edge.friend_uid) { "互为好友" } else { "等待对方添加" };
                info!("[CLI]   - {} | {}", edge.friend_uid, mark);
            }
            info!("[CLI] 📝 待处理的好友请求: {:?}", pending);
        }
        Command::Post {
            description,
            items,
            outfit_url,
            location,
            lat,
            lng,
        } => {
            let draft = PostDraft {
                description,
                items_id: items,
                outfit_url,
                location: location.map(|name| Location {
                    name,
                    latitude: lat,
                    longitude: lng,
                }),
                ..Default::default()
            };
            let post = client.publish_outfit(draft).await?;
            info!("[CLI] ✅ 发布成功: {}", post.post_uid);
        }
        Command::Feed { uids, recent } => {
            let posts = match (uids.is_empty(), recent) {
                (true, true) => client.get_friend_feed().await,
                (true, false) => client.get_friend_history().await,
                (false, true) => client.posts().get_recent_feed_for_uids(&uids).await,
                (false, false) => client.posts().get_feed_for_uids(&uids).await,
            };
            print_posts(&posts);
        }
        Command::Watch { duration } => watch(&client, duration).await,
        Command::PostedToday => {
            let posted = client.has_posted_today().await;
            info!("[CLI] 📅 今天{}发过帖子", if posted { "已经" } else { "还没有" });
        }
        Command::Delete { post_uid } => {
            client.posts().delete_post(&post_uid).await?;
            info!("[CLI] ✅ 已删除 {}", post_uid);
        }
    }

    Ok(())
}
