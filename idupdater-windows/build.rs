use embed_manifest::manifest::ExecutionLevel;
use embed_manifest::{embed_manifest, new_manifest};

fn main() {
    if std::env::var_os("CARGO_CFG_WINDOWS").is_some() {
        // Scheduling needs elevation, update checks do not; callers elevate as needed
        embed_manifest(
            new_manifest("RIA.IdUpdater")
                .version(3, 12, 0, 0)
                .requested_execution_level(ExecutionLevel::AsInvoker),
        )
        .expect("Failed to embed manifest");
    }
}
