pub mod reminder_sweep;
