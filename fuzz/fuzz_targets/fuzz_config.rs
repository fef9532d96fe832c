#![no_main]

use libfuzzer_sys::fuzz_target;

use infrastructure::config::AgentConfig;

// Fuzz the configuration parser with arbitrary YAML input.
//
// Parsing and validating may reject, never panic.
fuzz_target!(|data: &[u8]| {
    if let Ok(yaml) = std::str::from_utf8(data) {
        if yaml.len() <= 64 * 1024 {
            if let Ok(config) = AgentConfig::from_yaml(yaml) {
                let _ = config.validate();
            }
        }
    }
});
