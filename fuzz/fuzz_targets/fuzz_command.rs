//! Fuzz target: console command parser
//!
//! cargo fuzz run fuzz_command

#![no_main]

use hydrobot::app::commands::OperatorCommand;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    if let Ok(OperatorCommand::SetSchedule(arg)) = text.parse::<OperatorCommand>() {
        assert!(!arg.is_empty(), "schedule argument must not be empty");
        assert_eq!(arg.trim(), arg);
    }
});
