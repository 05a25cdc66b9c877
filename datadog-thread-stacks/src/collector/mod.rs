// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

pub(crate) mod completion_flag;
pub(crate) mod signal_data;
pub(crate) mod signal_handler;
pub(crate) mod signal_handler_manager;
pub(crate) mod stack_collector;
