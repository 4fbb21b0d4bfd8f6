//! Built-in GLSL programs. Every stage targets `#version 410 core`.
//!
//! G-buffer layout written by material shaders:
//!
//! | output | format | contents |
//! |---|---|---|
//! | 0 `gAlbedoSpec` | RGBA8 | albedo, opacity |
//! | 1 `gNormal` | RGBA16F | world normal, roughness |
//! | 2 `gPosition` | RGBA16F | world position * 0.1 |
//! | 3 `gEmission` | RGBA16F | emitted color |

/// Vertex and fragment source plus the uniforms resolved when it is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramSource {
    pub name: &'static str,
    pub vertex: &'static str,
    pub fragment: &'static str,
    pub uniforms: &'static [&'static str],
}

pub const MATERIAL_VERTEX: &str = r#"#version 410 core
layout(location = 0) in vec3 aPosition;
layout(location = 1) in vec3 aNormal;
layout(location = 2) in vec2 aTexCoord;

uniform mat4 uModel;
uniform mat4 uMVP;
uniform vec2 uUvShift;
uniform vec2 uUvSize;

out vec3 vWorldPos;
out vec3 vNormal;
out vec2 vUv;

void main() {
    vec4 world = uModel * vec4(aPosition, 1.0);
    vWorldPos = world.xyz;
    vNormal = mat3(transpose(inverse(uModel))) * aNormal;
    vUv = uUvShift + aTexCoord * uUvSize;
    gl_Position = uMVP * vec4(aPosition, 1.0);
}
"#;

/// Default deferred material: writes the G-buffer.
pub const PHONG_FRAGMENT: &str = r#"#version 410 core
in vec3 vWorldPos;
in vec3 vNormal;
in vec2 vUv;

uniform sampler2D tAlbedo;
uniform float uOpacity;
uniform float uRoughness;
uniform vec3 uEmission;

layout(location = 0) out vec4 gAlbedoSpec;
layout(location = 1) out vec4 gNormal;
layout(location = 2) out vec4 gPosition;
layout(location = 3) out vec4 gEmission;

void main() {
    vec4 albedo = texture(tAlbedo, vUv);
    gAlbedoSpec = vec4(albedo.rgb, albedo.a * uOpacity);
    gNormal = vec4(normalize(vNormal), uRoughness);
    gPosition = vec4(vWorldPos * 0.1, 1.0);
    gEmission = vec4(uEmission, 1.0);
}
"#;

/// Forward shader for the blending phase: one color output.
pub const SPRITE_FRAGMENT: &str = r#"#version 410 core
in vec3 vWorldPos;
in vec3 vNormal;
in vec2 vUv;

uniform sampler2D tAlbedo;
uniform float uOpacity;
uniform vec4 uTint;

out vec4 oColor;

void main() {
    vec4 albedo = texture(tAlbedo, vUv) * uTint;
    if (albedo.a * uOpacity < 0.004) {
        discard;
    }
    oColor = vec4(albedo.rgb, albedo.a * uOpacity);
}
"#;

const FULLSCREEN_VERTEX: &str = r#"#version 410 core
layout(location = 0) in vec3 aPosition;

out vec2 vUv;

void main() {
    vUv = aPosition.xy * 0.5 + 0.5;
    gl_Position = vec4(aPosition.xy, 0.0, 1.0);
}
"#;

const SKY_VERTEX: &str = r#"#version 410 core
layout(location = 0) in vec3 aPosition;

uniform mat4 uMVP;

out vec3 vDirection;

void main() {
    vDirection = aPosition;
    // Depth pinned to the far plane.
    gl_Position = (uMVP * vec4(aPosition, 1.0)).xyww;
}
"#;

const SKY_FRAGMENT: &str = r#"#version 410 core
in vec3 vDirection;

uniform sampler2D tEnvironment;
uniform float uEnvRotation;

layout(location = 0) out vec4 gAlbedoSpec;
layout(location = 1) out vec4 gNormal;
layout(location = 2) out vec4 gPosition;
layout(location = 3) out vec4 gEmission;

vec2 sphericalUv(vec3 d) {
    float c = cos(uEnvRotation);
    float s = sin(uEnvRotation);
    d = normalize(vec3(c * d.x - s * d.z, d.y, s * d.x + c * d.z));
    return vec2(atan(d.z, d.x) / 6.2831853 + 0.5, asin(clamp(d.y, -1.0, 1.0)) / 3.1415927 + 0.5);
}

void main() {
    gAlbedoSpec = vec4(0.0);
    gNormal = vec4(0.0);
    gPosition = vec4(0.0);
    gEmission = vec4(texture(tEnvironment, sphericalUv(vDirection)).rgb, 1.0);
}
"#;

const AMBIENT_FRAGMENT: &str = r#"#version 410 core
in vec2 vUv;

uniform sampler2D gAlbedoSpec;
uniform sampler2D gNormal;
uniform sampler2D gPosition;
uniform sampler2D gEmission;
uniform sampler2D tEnvironment;
uniform sampler2D tRadiance;
uniform vec3 uAmbient;
uniform vec3 uCameraPosition;
uniform int uHasEnvironment;
uniform float uEnvRotation;

out vec4 oColor;

vec2 sphericalUv(vec3 d) {
    float c = cos(uEnvRotation);
    float s = sin(uEnvRotation);
    d = normalize(vec3(c * d.x - s * d.z, d.y, s * d.x + c * d.z));
    return vec2(atan(d.z, d.x) / 6.2831853 + 0.5, asin(clamp(d.y, -1.0, 1.0)) / 3.1415927 + 0.5);
}

void main() {
    vec3 emission = texture(gEmission, vUv).rgb;
    vec4 normalRoughness = texture(gNormal, vUv);
    if (length(normalRoughness.xyz) < 0.001) {
        oColor = vec4(emission, 1.0);
        return;
    }
    vec3 albedo = texture(gAlbedoSpec, vUv).rgb;
    vec3 n = normalize(normalRoughness.xyz);
    float roughness = normalRoughness.a;
    vec3 ambient = uAmbient;
    vec3 reflection = vec3(0.0);
    if (uHasEnvironment == 1) {
        vec3 position = texture(gPosition, vUv).xyz * 10.0;
        vec3 r = reflect(normalize(position - uCameraPosition), n);
        vec3 diffuse = texture(tRadiance, sphericalUv(n)).rgb;
        vec3 sharp = texture(tEnvironment, sphericalUv(r)).rgb;
        ambient += diffuse;
        reflection = mix(sharp, diffuse, roughness) * (1.0 - roughness);
    }
    oColor = vec4(albedo * ambient + reflection + emission, 1.0);
}
"#;

const SUN_FRAGMENT: &str = r#"#version 410 core
in vec2 vUv;

uniform sampler2D gAlbedoSpec;
uniform sampler2D gNormal;
uniform vec3 uLightDirection;
uniform vec3 uLightColor;

out vec4 oColor;

void main() {
    vec4 normal = texture(gNormal, vUv);
    if (length(normal.xyz) < 0.001) {
        discard;
    }
    float nDotL = max(dot(normalize(normal.xyz), -normalize(uLightDirection)), 0.0);
    oColor = vec4(texture(gAlbedoSpec, vUv).rgb * uLightColor * nDotL, 1.0);
}
"#;

const SUN_SHADOW_FRAGMENT: &str = r#"#version 410 core
in vec2 vUv;

uniform sampler2D gAlbedoSpec;
uniform sampler2D gNormal;
uniform sampler2D gPosition;
uniform sampler2D tShadow;
uniform vec3 uLightDirection;
uniform vec3 uLightColor;
uniform vec3 uCameraPosition;
uniform mat4 uLightSpace;
uniform float uShadowTexel;

out vec4 oColor;

const float PI = 3.14159265;

float distributionGGX(float nDotH, float roughness) {
    float a = roughness * roughness;
    float a2 = a * a;
    float d = nDotH * nDotH * (a2 - 1.0) + 1.0;
    return a2 / (PI * d * d);
}

float geometrySchlickGGX(float nDotX, float roughness) {
    float k = (roughness + 1.0) * (roughness + 1.0) / 8.0;
    return nDotX / (nDotX * (1.0 - k) + k);
}

vec3 fresnelSchlick(float cosTheta, vec3 f0) {
    return f0 + (1.0 - f0) * pow(clamp(1.0 - cosTheta, 0.0, 1.0), 5.0);
}

float shadowFactor(vec3 world, float nDotL) {
    vec4 lightSpace = uLightSpace * vec4(world, 1.0);
    vec3 p = lightSpace.xyz / lightSpace.w * 0.5 + 0.5;
    if (p.z > 1.0) {
        return 1.0;
    }
    float bias = max(0.005 * (1.0 - nDotL), 0.0005);
    float lit = 0.0;
    for (int x = -2; x <= 2; ++x) {
        for (int y = -2; y <= 2; ++y) {
            float depth = texture(tShadow, p.xy + vec2(x, y) * uShadowTexel).r;
            lit += p.z - bias > depth ? 0.0 : 1.0;
        }
    }
    return lit / 25.0;
}

void main() {
    vec4 normalRoughness = texture(gNormal, vUv);
    if (length(normalRoughness.xyz) < 0.001) {
        discard;
    }
    vec3 albedo = texture(gAlbedoSpec, vUv).rgb;
    vec3 world = texture(gPosition, vUv).xyz * 10.0;
    vec3 n = normalize(normalRoughness.xyz);
    vec3 l = -normalize(uLightDirection);
    vec3 v = normalize(uCameraPosition - world);
    vec3 h = normalize(v + l);
    float roughness = clamp(normalRoughness.a, 0.04, 1.0);

    float nDotL = max(dot(n, l), 0.0);
    float nDotV = max(dot(n, v), 0.0);
    vec3 f = fresnelSchlick(max(dot(h, v), 0.0), vec3(0.04));
    float g = geometrySchlickGGX(nDotV, roughness) * geometrySchlickGGX(nDotL, roughness);
    vec3 specular = distributionGGX(max(dot(n, h), 0.0), roughness) * g * f
        / (4.0 * nDotV * nDotL + 0.0001);
    vec3 diffuse = (vec3(1.0) - f) * albedo;

    float shadow = shadowFactor(world, nDotL);
    oColor = vec4((diffuse + specular) * uLightColor * nDotL * shadow, 1.0);
}
"#;

const OMNI_FRAGMENT: &str = r#"#version 410 core
in vec2 vUv;

uniform sampler2D gAlbedoSpec;
uniform sampler2D gNormal;
uniform sampler2D gPosition;
uniform vec3 uLightPosition;
uniform vec3 uLightColor;
uniform float uAffectDistance;

out vec4 oColor;

void main() {
    vec4 normal = texture(gNormal, vUv);
    if (length(normal.xyz) < 0.001) {
        discard;
    }
    vec3 world = texture(gPosition, vUv).xyz * 10.0;
    vec3 toLight = uLightPosition - world;
    float falloff = max(1.0 - length(toLight) / uAffectDistance, 0.0);
    float nDotL = max(dot(normalize(normal.xyz), normalize(toLight)), 0.0);
    oColor = vec4(texture(gAlbedoSpec, vUv).rgb * uLightColor * nDotL * falloff, 1.0);
}
"#;

const SHADOW_DEPTH_VERTEX: &str = r#"#version 410 core
layout(location = 0) in vec3 aPosition;

uniform mat4 uLightMVP;

void main() {
    gl_Position = uLightMVP * vec4(aPosition, 1.0);
}
"#;

const SHADOW_DEPTH_FRAGMENT: &str = r#"#version 410 core
void main() {
}
"#;

const LINES_VERTEX: &str = r#"#version 410 core
layout(location = 0) in vec3 aPosition;

uniform mat4 uViewProjection;

void main() {
    gl_Position = uViewProjection * vec4(aPosition, 1.0);
}
"#;

const LINES_FRAGMENT: &str = r#"#version 410 core
uniform vec4 uColor;

out vec4 oColor;

void main() {
    oColor = uColor;
}
"#;

const COMPOSITE_FRAGMENT: &str = r#"#version 410 core
in vec2 vUv;

uniform sampler2D tLightning;
uniform float uGamma;

out vec4 oColor;

vec3 encode(vec3 c) {
    return clamp(1.055 * pow(max(c, vec3(0.0)), vec3(1.0 / uGamma)) - 0.055, 0.0, 1.0);
}

void main() {
    oColor = vec4(encode(texture(tLightning, vUv).rgb), 1.0);
}
"#;

const COMPOSITE_FXAA_FRAGMENT: &str = r#"#version 410 core
in vec2 vUv;

uniform sampler2D tLightning;
uniform float uGamma;
uniform vec2 uInverseScreenSize;

out vec4 oColor;

const float FXAA_SPAN_MAX = 8.0;
const float FXAA_REDUCE_MUL = 1.0 / 8.0;
const float FXAA_REDUCE_MIN = 1.0 / 128.0;

vec3 encode(vec3 c) {
    return clamp(1.055 * pow(max(c, vec3(0.0)), vec3(1.0 / uGamma)) - 0.055, 0.0, 1.0);
}

vec3 sampleEncoded(vec2 uv) {
    return encode(texture(tLightning, uv).rgb);
}

void main() {
    vec3 luma = vec3(0.299, 0.587, 0.114);
    float lumaNW = dot(sampleEncoded(vUv + vec2(-1.0, -1.0) * uInverseScreenSize), luma);
    float lumaNE = dot(sampleEncoded(vUv + vec2(1.0, -1.0) * uInverseScreenSize), luma);
    float lumaSW = dot(sampleEncoded(vUv + vec2(-1.0, 1.0) * uInverseScreenSize), luma);
    float lumaSE = dot(sampleEncoded(vUv + vec2(1.0, 1.0) * uInverseScreenSize), luma);
    float lumaM = dot(sampleEncoded(vUv), luma);
    float lumaMin = min(lumaM, min(min(lumaNW, lumaNE), min(lumaSW, lumaSE)));
    float lumaMax = max(lumaM, max(max(lumaNW, lumaNE), max(lumaSW, lumaSE)));

    vec2 dir = vec2(-((lumaNW + lumaNE) - (lumaSW + lumaSE)), (lumaNW + lumaSW) - (lumaNE + lumaSE));
    float dirReduce = max((lumaNW + lumaNE + lumaSW + lumaSE) * 0.25 * FXAA_REDUCE_MUL, FXAA_REDUCE_MIN);
    float rcpDirMin = 1.0 / (min(abs(dir.x), abs(dir.y)) + dirReduce);
    dir = clamp(dir * rcpDirMin, vec2(-FXAA_SPAN_MAX), vec2(FXAA_SPAN_MAX)) * uInverseScreenSize;

    vec3 rgbA = 0.5 * (sampleEncoded(vUv + dir * (1.0 / 3.0 - 0.5)) + sampleEncoded(vUv + dir * (2.0 / 3.0 - 0.5)));
    vec3 rgbB = rgbA * 0.5 + 0.25 * (sampleEncoded(vUv - dir * 0.5) + sampleEncoded(vUv + dir * 0.5));
    float lumaB = dot(rgbB, luma);
    oColor = vec4((lumaB < lumaMin || lumaB > lumaMax) ? rgbA : rgbB, 1.0);
}
"#;

pub const GBUFFER_SAMPLERS: [&str; 4] = ["gAlbedoSpec", "gNormal", "gPosition", "gEmission"];

pub const SKY: ProgramSource = ProgramSource {
    name: "builtin/sky",
    vertex: SKY_VERTEX,
    fragment: SKY_FRAGMENT,
    uniforms: &["uMVP", "tEnvironment", "uEnvRotation"],
};

pub const AMBIENT: ProgramSource = ProgramSource {
    name: "builtin/ambient",
    vertex: FULLSCREEN_VERTEX,
    fragment: AMBIENT_FRAGMENT,
    uniforms: &[
        "gAlbedoSpec",
        "gNormal",
        "gPosition",
        "gEmission",
        "tEnvironment",
        "tRadiance",
        "uAmbient",
        "uCameraPosition",
        "uHasEnvironment",
        "uEnvRotation",
    ],
};

pub const SUN: ProgramSource = ProgramSource {
    name: "builtin/sun",
    vertex: FULLSCREEN_VERTEX,
    fragment: SUN_FRAGMENT,
    uniforms: &["gAlbedoSpec", "gNormal", "uLightDirection", "uLightColor"],
};

pub const SUN_SHADOW: ProgramSource = ProgramSource {
    name: "builtin/sun_shadow",
    vertex: FULLSCREEN_VERTEX,
    fragment: SUN_SHADOW_FRAGMENT,
    uniforms: &[
        "gAlbedoSpec",
        "gNormal",
        "gPosition",
        "tShadow",
        "uLightDirection",
        "uLightColor",
        "uCameraPosition",
        "uLightSpace",
        "uShadowTexel",
    ],
};

pub const OMNI: ProgramSource = ProgramSource {
    name: "builtin/omni",
    vertex: FULLSCREEN_VERTEX,
    fragment: OMNI_FRAGMENT,
    uniforms: &[
        "gAlbedoSpec",
        "gNormal",
        "gPosition",
        "uLightPosition",
        "uLightColor",
        "uAffectDistance",
    ],
};

pub const SHADOW_DEPTH: ProgramSource = ProgramSource {
    name: "builtin/shadow_depth",
    vertex: SHADOW_DEPTH_VERTEX,
    fragment: SHADOW_DEPTH_FRAGMENT,
    uniforms: &["uLightMVP"],
};

pub const DEBUG_LINES: ProgramSource = ProgramSource {
    name: "builtin/debug_lines",
    vertex: LINES_VERTEX,
    fragment: LINES_FRAGMENT,
    uniforms: &["uViewProjection", "uColor"],
};

pub const COMPOSITE: ProgramSource = ProgramSource {
    name: "builtin/composite",
    vertex: FULLSCREEN_VERTEX,
    fragment: COMPOSITE_FRAGMENT,
    uniforms: &["tLightning", "uGamma"],
};

pub const COMPOSITE_FXAA: ProgramSource = ProgramSource {
    name: "builtin/composite_fxaa",
    vertex: FULLSCREEN_VERTEX,
    fragment: COMPOSITE_FXAA_FRAGMENT,
    uniforms: &["tLightning", "uGamma", "uInverseScreenSize"],
};

pub const PIPELINE: [ProgramSource; 9] = [
    SKY,
    AMBIENT,
    SUN,
    SUN_SHADOW,
    OMNI,
    SHADOW_DEPTH,
    DEBUG_LINES,
    COMPOSITE,
    COMPOSITE_FXAA,
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::headless::{check_glsl, declared_uniforms};

    #[test]
    fn every_stage_passes_the_structural_check() {
        for p in PIPELINE {
            assert!(check_glsl(p.vertex).is_ok(), "{} vertex", p.name);
            assert!(check_glsl(p.fragment).is_ok(), "{} fragment", p.name);
            assert!(p.vertex.starts_with("#version 410 core"));
            assert!(p.fragment.starts_with("#version 410 core"));
        }
        for fragment in [PHONG_FRAGMENT, SPRITE_FRAGMENT] {
            assert!(check_glsl(fragment).is_ok());
        }
    }

    #[test]
    fn listed_uniforms_are_declared() {
        for p in PIPELINE {
            let mut declared = declared_uniforms(p.vertex);
            declared.extend(declared_uniforms(p.fragment));
            for u in p.uniforms {
                assert!(declared.iter().any(|d| d == u), "{}: {u}", p.name);
            }
        }
    }
}
