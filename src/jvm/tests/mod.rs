//! JVM 编码层测试

pub mod constant_pool;
