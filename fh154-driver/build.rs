use std::collections::HashMap;
use std::env;
use std::fmt::Write;
use std::path::PathBuf;

fn main() {
    // (Variable, Type, Default value)
    let mut const_config: HashMap<&str, (&str, &str)> = HashMap::from([
        ("MAC_MIN_BE", ("u8", "3")),
        ("MAC_MAX_BE", ("u8", "5")),
        ("MAC_ALT_BE", ("u8", "4")),
        ("MAC_MAX_CSMA_BACKOFFS", ("u8", "4")),
        ("MAC_MAX_FRAME_RETRIES", ("u8", "3")),
        ("MAC_TX_DATA_MAX", ("u8", "5")),
        ("MAC_MAX_FRAME_SIZE", ("u16", "500")),
        (
            "FH_BC_INTERVAL",
            ("SymbolDuration", "SymbolDuration::millis(1020)"),
        ),
        (
            "FH_BC_DWELL_INTERVAL",
            ("SymbolDuration", "SymbolDuration::millis(255)"),
        ),
        (
            "FH_UC_DWELL_INTERVAL",
            ("SymbolDuration", "SymbolDuration::millis(255)"),
        ),
        (
            "FH_SLOT_EDGE_GUARD",
            ("SymbolDuration", "SymbolDuration::millis(5)"),
        ),
        ("FH_CSMA_BASE_BACKOFF", ("u8", "0")),
        ("FH_CLOCK_DRIFT_PPM", ("u8", "20")),
        ("MAC_ACTIVITY_THRESHOLD_NORMAL", ("u8", "2")),
        ("MAC_ACTIVITY_THRESHOLD_HIGH", ("u8", "4")),
        ("MAC_ACTIVITY_THRESHOLD_URGENT", ("u8", "3")),
        ("MAC_ACTIVITY_MISS_INCREMENT", ("u8", "1")),
    ]);

    // Make sure we get rerun if needed
    println!("cargo:rerun-if-changed=build.rs");
    for name in const_config.keys() {
        println!("cargo:rerun-if-env-changed=FH154_{name}");
    }

    // Collect environment variables
    let mut data = String::new();
    // Write preamble
    writeln!(data, "use crate::time::SymbolDuration;\n").unwrap();

    for (var, value) in std::env::vars() {
        if let Some(name) = var.strip_prefix("FH154_") {
            // discard from hashmap as a way of consuming the setting
            let Some((_, (ty, _))) = const_config.remove_entry(name) else {
                panic!("Wrong configuration name {name}");
            };

            // write to file
            writeln!(data, "pub const {name}: {ty} = {value};").unwrap();
        }
    }

    // Take the remaining configs and write the default value to the file
    for (name, (ty, value)) in const_config.iter() {
        writeln!(data, "pub const {name}: {ty} = {value};").unwrap();
    }

    // Now that we have the code of the configuration, actually write it to a file
    let out_dir = PathBuf::from(env::var_os("OUT_DIR").unwrap());
    let out_file = out_dir.join("config.rs");
    std::fs::write(out_file, data).unwrap();
}
