use anyhow::Result;

use snapwarden::SnapConfig;

pub fn exec(cfg: &SnapConfig) -> Result<bool> {
    println!("{cfg}");
    match cfg.validate() {
        Ok(()) => println!("config: OK"),
        Err(e) => println!("config: {e}"),
    }
    if let Err(e) = cfg.freeze_plan() {
        println!("config: {e}");
    }
    Ok(true)
}
