use std::path::PathBuf;

use tillroll::db::{get_connection, init_db};
use tillroll::error::Result;
use tillroll::settings::{load_settings, save_settings, shellexpand_path};

pub fn run(data_dir: Option<String>) -> Result<()> {
    let mut settings = load_settings();
    let dir = match data_dir {
        Some(d) => {
            // canonicalize only works once the directory exists
            std::fs::create_dir_all(shellexpand_path(&d))?;
            shellexpand_path(&d)
        }
        None => settings.data_dir.clone(),
    };
    let dir = PathBuf::from(dir);
    std::fs::create_dir_all(&dir)?;

    settings.data_dir = dir.to_string_lossy().to_string();
    save_settings(&settings)?;

    let db_path = settings.db_path();
    let existed = db_path.exists();
    let conn = get_connection(&db_path)?;
    init_db(&conn)?;

    if existed {
        println!("Using existing database at {}", db_path.display());
    } else {
        println!("Initialized tillroll at {}", dir.display());
    }
    Ok(())
}
