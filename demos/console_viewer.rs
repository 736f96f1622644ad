//! 在控制台中显示 foobar2000 当前播放的曲目。
//!
//! 用法: `cargo run --example console_viewer [配置文件.toml]`

#[cfg(windows)]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    use foobar_nowplaying::{NowPlayingManager, SupervisorConfig, platform::win32::Win32Host};
    use log::{error, info};

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => SupervisorConfig::load(path)?,
        None => SupervisorConfig::default(),
    };

    let controller = match NowPlayingManager::start(config, Win32Host) {
        Ok(controller) => controller,
        Err(e) => {
            error!("无法启动 foobar2000: {e}");
            return Err(e.into());
        }
    };

    info!("图标资源: {}", controller.icon_resource());
    info!("关闭 foobar2000 即可退出程序。");

    let changes = controller.subscribe();
    while let Ok(field) = changes.recv() {
        let current = controller.current();
        info!("[{}] {}", field.name(), field.get(&current));
        if current.is_empty() {
            info!("(当前没有在播放)");
        }
    }

    Ok(())
}

#[cfg(not(windows))]
fn main() {
    eprintln!("console_viewer 只能在 Windows 上运行。");
}
