pub mod events; // Text-to-calendar-event extraction
