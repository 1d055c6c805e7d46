//! 调用方处理器模块

pub mod run_command;
