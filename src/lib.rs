// 分层结构：shared -> domain -> application -> infrastructure -> interfaces
// 所有模块都是公共的，二进制文件、集成测试和基准测试都能访问

pub mod shared;
pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod interfaces;
