//! The `adaptest init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    if Path::new("adaptest.toml").exists() {
        println!("adaptest.toml already exists, skipping.");
    } else {
        std::fs::write("adaptest.toml", SAMPLE_CONFIG)?;
        println!("Created adaptest.toml");
    }

    std::fs::create_dir_all("pools")?;
    let example_path = Path::new("pools/example.toml");
    if example_path.exists() {
        println!("pools/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_POOL)?;
        println!("Created pools/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Run: adaptest validate --pool pools/example.toml");
    println!("  2. Run: adaptest plan --pool pools/example.toml");
    println!("  3. Run: adaptest simulate --pool pools/example.toml --no-sources");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# adaptest configuration

supplementary_per_type = 5
parallelism = 4
max_retries = 3
retry_delay_ms = 1000

[exam]
total_time_secs = 3600
window_size = 10
starting_difficulty = 5
mode = "adaptive"

[[exam.quotas]]
subject = "logic"
single = 6
multiple = 3

[[exam.quotas]]
subject = "reading"
single = 6
multiple = 3

[[exam.quotas]]
subject = "mathematics"
single = 6
multiple = 3

[[exam.quotas]]
subject = "data_interpretation"
single = 6
multiple = 3

# Supplementary sources are fetched before the session starts.
# [sources.remote]
# type = "http"
# base_url = "https://questions.example.com/api"
# api_key = "${ADAPTEST_SOURCE_KEY}"
#
# [sources.local]
# type = "directory"
# path = "pools/extra"
"#;

const EXAMPLE_POOL: &str = include_str!("../../assets/example-pool.toml");
