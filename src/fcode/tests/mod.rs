//! fcode 模块测试
