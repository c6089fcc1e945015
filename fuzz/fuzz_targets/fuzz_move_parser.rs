#![no_main]
use libfuzzer_sys::fuzz_target;

use gantry_core::grid::MoveCommand;

fuzz_target!(|data: &str| {
    // Move strings come straight off the host link; parsing must never
    // panic, and anything accepted must survive a round trip.
    if let Ok(mv) = data.parse::<MoveCommand>() {
        let rendered = mv.to_string();
        let reparsed: MoveCommand = rendered.parse().expect("rendered move reparses");
        assert_eq!(mv, reparsed);
    }
});
