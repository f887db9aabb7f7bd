mod reload_tests;
mod rendering_tests;
