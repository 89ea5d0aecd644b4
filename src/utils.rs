use anyhow::anyhow;
use directories::ProjectDirs;
use once_cell::sync::OnceCell;
use std::path::Path;

fn project_dirs() -> anyhow::Result<&'static ProjectDirs> {
    static DIRS: OnceCell<ProjectDirs> = OnceCell::new();
    DIRS.get_or_try_init(|| {
        ProjectDirs::from("none", "qcjob", "qcjob").ok_or(anyhow!("Failed to get project dirs"))
    })
}

pub fn data_dir() -> anyhow::Result<&'static Path> {
    static DATA_DIR: OnceCell<Box<Path>> = OnceCell::new();
    DATA_DIR
        .get_or_try_init(|| {
            let path = project_dirs()?.data_dir();
            std::fs::create_dir_all(path)?;
            Ok::<_, anyhow::Error>(path.into())
        })
        .map(|p| p.as_ref())
}

pub fn config_dir() -> anyhow::Result<&'static Path> {
    static CONFIG_DIR: OnceCell<Box<Path>> = OnceCell::new();
    CONFIG_DIR
        .get_or_try_init(|| {
            let path = project_dirs()?.config_dir();
            std::fs::create_dir_all(path)?;
            Ok::<_, anyhow::Error>(path.into())
        })
        .map(|p| p.as_ref())
}
